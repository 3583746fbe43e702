//! Persistence errors

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another active reservation already holds this key
    #[error("Unique constraint violated for unit {unit_id} at {slot_start}")]
    UniqueViolation {
        unit_id: String,
        slot_start: DateTime<Utc>,
    },

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<PersistenceError> for voice_turn_core::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(what) => voice_turn_core::Error::NotFound(what),
            e @ PersistenceError::UniqueViolation { .. } => {
                voice_turn_core::Error::Conflict(e.to_string())
            },
            PersistenceError::InvalidTransition(msg) => voice_turn_core::Error::Conflict(msg),
            PersistenceError::InvalidData(msg) => voice_turn_core::Error::Validation(msg),
        }
    }
}
