//! Main settings module

use chrono::NaiveTime;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{booking, timing};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Voice activity detection
    #[serde(default)]
    pub vad: VadConfig,

    /// Transcription adapter
    #[serde(default)]
    pub transcript: TranscriptConfig,

    /// Synthesis adapter
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Turn state machine
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Session registry
    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub booking: BookingConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_vad()?;
        self.validate_transcript()?;
        self.validate_orchestrator()?;
        self.validate_sessions()?;
        self.validate_booking()?;
        self.validate_planner()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::invalid("server.port", "Port cannot be 0"));
        }

        if server.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "server.request_timeout_secs",
                "Timeout must be at least 1 second",
            ));
        }

        // CORS validation in production
        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_vad(&self) -> Result<(), ConfigError> {
        let vad = &self.vad;

        if vad.frame_ms == 0 || vad.frame_ms > 60 {
            return Err(ConfigError::invalid(
                "vad.frame_ms",
                format!("Must be between 1 and 60, got {}", vad.frame_ms),
            ));
        }

        if vad.trigger_ms == 0 || vad.trigger_ms % vad.frame_ms != 0 {
            return Err(ConfigError::invalid(
                "vad.trigger_ms",
                format!("Must be a positive multiple of frame_ms ({})", vad.frame_ms),
            ));
        }

        if vad.hangover_ms == 0 || vad.hangover_ms % vad.frame_ms != 0 {
            return Err(ConfigError::invalid(
                "vad.hangover_ms",
                format!("Must be a positive multiple of frame_ms ({})", vad.frame_ms),
            ));
        }

        if vad.watchdog_ms <= vad.hangover_ms {
            return Err(ConfigError::invalid(
                "vad.watchdog_ms",
                format!("Must exceed hangover_ms ({})", vad.hangover_ms),
            ));
        }

        if !(-96.0..=0.0).contains(&vad.energy_threshold_db) {
            return Err(ConfigError::invalid(
                "vad.energy_threshold_db",
                format!("Must be between -96 and 0 dB, got {}", vad.energy_threshold_db),
            ));
        }

        Ok(())
    }

    fn validate_transcript(&self) -> Result<(), ConfigError> {
        let t = &self.transcript;

        if t.buffer == 0 {
            return Err(ConfigError::invalid("transcript.buffer", "Must be at least 1"));
        }

        if t.reconnect_initial_backoff_ms == 0
            || t.reconnect_initial_backoff_ms > t.reconnect_max_backoff_ms
        {
            return Err(ConfigError::invalid(
                "transcript.reconnect_initial_backoff_ms",
                "Must be positive and not exceed reconnect_max_backoff_ms",
            ));
        }

        Ok(())
    }

    fn validate_orchestrator(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;

        if o.context_window < 2 {
            return Err(ConfigError::invalid(
                "orchestrator.context_window",
                format!("Must be at least 2, got {}", o.context_window),
            ));
        }

        for (field, value) in [
            ("orchestrator.planning_timeout_ms", o.planning_timeout_ms),
            ("orchestrator.tool_timeout_ms", o.tool_timeout_ms),
            ("orchestrator.speech_start_timeout_ms", o.speech_start_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "Timeout cannot be 0"));
            }
        }

        if o.event_buffer == 0 {
            return Err(ConfigError::invalid("orchestrator.event_buffer", "Must be at least 1"));
        }

        Ok(())
    }

    fn validate_sessions(&self) -> Result<(), ConfigError> {
        let s = &self.sessions;

        if s.max_sessions == 0 {
            return Err(ConfigError::invalid("sessions.max_sessions", "Must be at least 1"));
        }

        if s.idle_timeout_secs == 0 {
            return Err(ConfigError::invalid("sessions.idle_timeout_secs", "Cannot be 0"));
        }

        if s.cleanup_interval_secs == 0 || s.cleanup_interval_secs > s.idle_timeout_secs {
            return Err(ConfigError::invalid(
                "sessions.cleanup_interval_secs",
                "Must be positive and not exceed idle_timeout_secs",
            ));
        }

        Ok(())
    }

    fn validate_booking(&self) -> Result<(), ConfigError> {
        let b = &self.booking;

        if b.slot_duration_minutes <= 0 {
            return Err(ConfigError::invalid(
                "booking.slot_duration_minutes",
                "Must be positive",
            ));
        }

        if b.slot_times.is_empty() {
            return Err(ConfigError::invalid("booking.slot_times", "At least one slot time"));
        }

        for raw in &b.slot_times {
            if NaiveTime::parse_from_str(raw, "%H:%M").is_err() {
                return Err(ConfigError::invalid(
                    "booking.slot_times",
                    format!("Expected HH:MM, got '{}'", raw),
                ));
            }
        }

        if b.default_days_ahead == 0 || b.default_days_ahead > b.max_days_ahead {
            return Err(ConfigError::invalid(
                "booking.default_days_ahead",
                format!("Must be between 1 and max_days_ahead ({})", b.max_days_ahead),
            ));
        }

        Ok(())
    }

    fn validate_planner(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.planner.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::invalid(
                    "planner.endpoint",
                    format!("Must be an http(s) URL, got '{}'", endpoint),
                ));
            }
        } else if self.environment.is_strict() {
            tracing::warn!("No planner endpoint configured; using the rule planner");
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            // Empty by default; must be configured for production
            cors_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Voice activity monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Expected frame duration
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,

    /// Frame energy above this counts as speech
    #[serde(default = "default_energy_threshold_db")]
    pub energy_threshold_db: f32,

    /// Continuous speech needed to raise `start`
    #[serde(default = "default_trigger_ms")]
    pub trigger_ms: u64,

    /// Continuous silence needed to raise `stop`
    #[serde(default = "default_hangover_ms")]
    pub hangover_ms: u64,

    /// Gap in frame arrival that counts as stalled audio
    #[serde(default = "default_watchdog_ms")]
    pub watchdog_ms: u64,
}

fn default_frame_ms() -> u64 {
    timing::VAD_FRAME_MS
}
fn default_energy_threshold_db() -> f32 {
    -40.0
}
fn default_trigger_ms() -> u64 {
    timing::VAD_TRIGGER_MS
}
fn default_hangover_ms() -> u64 {
    timing::VAD_HANGOVER_MS
}
fn default_watchdog_ms() -> u64 {
    timing::VAD_WATCHDOG_MS
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            frame_ms: default_frame_ms(),
            energy_threshold_db: default_energy_threshold_db(),
            trigger_ms: default_trigger_ms(),
            hangover_ms: default_hangover_ms(),
            watchdog_ms: default_watchdog_ms(),
        }
    }
}

/// Transcript stream adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Caption channel capacity
    #[serde(default = "default_transcript_buffer")]
    pub buffer: usize,

    #[serde(default = "default_initial_backoff")]
    pub reconnect_initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub reconnect_max_backoff_ms: u64,

    /// Consecutive failed reconnects before giving up (0 = never give up)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_transcript_buffer() -> usize {
    64
}
fn default_initial_backoff() -> u64 {
    timing::RECONNECT_INITIAL_BACKOFF_MS
}
fn default_max_backoff() -> u64 {
    timing::RECONNECT_MAX_BACKOFF_MS
}
fn default_max_reconnect_attempts() -> u32 {
    5
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            buffer: default_transcript_buffer(),
            reconnect_initial_backoff_ms: default_initial_backoff(),
            reconnect_max_backoff_ms: default_max_backoff(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

/// Speech stream adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Output frame duration
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,

    /// Yield frames no faster than playback
    #[serde(default = "default_true")]
    pub realtime_pacing: bool,

    /// Frame channel capacity
    #[serde(default = "default_speech_buffer")]
    pub buffer: usize,
}

fn default_speech_buffer() -> usize {
    32
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            frame_ms: default_frame_ms(),
            realtime_pacing: default_true(),
            buffer: default_speech_buffer(),
        }
    }
}

/// Turn orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Utterances kept in the rolling window
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default = "default_planning_timeout")]
    pub planning_timeout_ms: u64,

    /// Per tool call
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_ms: u64,

    /// Synthesizer must produce a stream within this
    #[serde(default = "default_speech_start_timeout")]
    pub speech_start_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub barge_in_enabled: bool,

    /// Broadcast capacity for session events
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_context_window() -> usize {
    20
}
fn default_planning_timeout() -> u64 {
    timing::PLANNING_TIMEOUT_MS
}
fn default_tool_timeout() -> u64 {
    timing::TOOL_TIMEOUT_MS
}
fn default_speech_start_timeout() -> u64 {
    timing::SPEECH_START_TIMEOUT_MS
}
fn default_event_buffer() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            planning_timeout_ms: default_planning_timeout(),
            tool_timeout_ms: default_tool_timeout(),
            speech_start_timeout_ms: default_speech_start_timeout(),
            barge_in_enabled: default_true(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Session registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Sessions with no events for this long are closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_max_sessions() -> usize {
    100
}
fn default_idle_timeout() -> u64 {
    900
}
fn default_cleanup_interval() -> u64 {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

/// Viewing slot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    #[serde(default = "default_slot_duration")]
    pub slot_duration_minutes: i64,

    /// Daily slot start times, `HH:MM` UTC
    #[serde(default = "default_slot_times")]
    pub slot_times: Vec<String>,

    #[serde(default = "default_days_ahead")]
    pub default_days_ahead: u32,

    #[serde(default = "default_max_days_ahead")]
    pub max_days_ahead: u32,
}

fn default_slot_duration() -> i64 {
    booking::SLOT_DURATION_MINUTES
}
fn default_slot_times() -> Vec<String> {
    booking::SLOT_TIMES.iter().map(|s| s.to_string()).collect()
}
fn default_days_ahead() -> u32 {
    booking::DEFAULT_DAYS_AHEAD
}
fn default_max_days_ahead() -> u32 {
    booking::MAX_DAYS_AHEAD
}

impl BookingConfig {
    /// Parsed slot times; entries that fail to parse are skipped
    pub fn daily_slots(&self) -> Vec<NaiveTime> {
        let mut times: Vec<NaiveTime> = self
            .slot_times
            .iter()
            .filter_map(|raw| NaiveTime::parse_from_str(raw, "%H:%M").ok())
            .collect();
        times.sort();
        times
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            slot_duration_minutes: default_slot_duration(),
            slot_times: default_slot_times(),
            default_days_ahead: default_days_ahead(),
            max_days_ahead: default_max_days_ahead(),
        }
    }
}

/// Planning port configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlannerConfig {
    /// Remote planner URL; `None` selects the rule planner
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Serve Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (VOICE_TURN__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings with `dir` as the configuration directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_path = dir.join(env_name);
        builder =
            builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_TURN")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.cors_origins")
            .with_list_parse_key("booking.slot_times")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
