//! Error types for the voice-turn orchestrator
//!
//! Nothing here is fatal to the process. Every variant is recovered inside the
//! session that produced it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed tool arguments or request fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// ASR, TTS, planner or tool did not answer in time
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// ASR/TTS/planner connection dropped
    #[error("Upstream disconnected: {0}")]
    UpstreamDisconnect(String),

    /// Slot already held or confirmed
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A requested figure is absent from the backing record
    #[error("Grounding miss: {0}")]
    GroundingMiss(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// Stable, serializable name of an error variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    UpstreamTimeout,
    UpstreamDisconnect,
    Conflict,
    GroundingMiss,
    NotFound,
    SessionClosed,
    Config,
    Serialization,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamDisconnect => "upstream_disconnect",
            ErrorKind::Conflict => "conflict",
            ErrorKind::GroundingMiss => "grounding_miss",
            ErrorKind::NotFound => "not_found",
            ErrorKind::SessionClosed => "session_closed",
            ErrorKind::Config => "config",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            Error::UpstreamDisconnect(_) => ErrorKind::UpstreamDisconnect,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::GroundingMiss(_) => ErrorKind::GroundingMiss,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::SessionClosed(_) => ErrorKind::SessionClosed,
            Error::Config(_) => ErrorKind::Config,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::UpstreamTimeout(_) | Error::UpstreamDisconnect(_))
    }
}

/// Streaming adapter errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Upstream disconnected: {0}")]
    Disconnected(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Vendor error: {0}")]
    Vendor(String),
}

impl From<PipelineError> for Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Timeout(ms) => Error::UpstreamTimeout(format!("no response after {}ms", ms)),
            PipelineError::Disconnected(reason) => Error::UpstreamDisconnect(reason),
            PipelineError::ChannelClosed => Error::UpstreamDisconnect("channel closed".to_string()),
            PipelineError::Vendor(message) => Error::UpstreamDisconnect(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(Error::Conflict("x".into()).kind().as_str(), "conflict");
        assert_eq!(
            Error::Validation("bad".into()).kind().to_string(),
            "validation_error"
        );
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let err: Error = PipelineError::Timeout(250).into();
        assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
        assert!(err.is_transient());

        let err: Error = PipelineError::ChannelClosed.into();
        assert_eq!(err.kind(), ErrorKind::UpstreamDisconnect);

        assert!(!Error::Conflict("taken".into()).is_transient());
    }
}
