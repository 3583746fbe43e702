//! Configuration management for the voice-turn orchestrator
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, then `config/{env}`)
//! - Environment variables (VOICE_TURN__ prefix, `__` separator)
//!
//! Every field carries a serde default, so an empty environment yields a
//! runnable development configuration.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, BookingConfig, ObservabilityConfig, OrchestratorConfig,
    PlannerConfig, RuntimeEnvironment, ServerConfig, SessionConfig, Settings, SpeechConfig,
    TranscriptConfig, VadConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => ConfigError::FileNotFound(path),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
