//! Application State
//!
//! Shared state across all handlers.

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;

use voice_turn_agent::{create_planner, TurnOrchestrator};
use voice_turn_config::Settings;
use voice_turn_core::Planner;
use voice_turn_pipeline::{
    ScriptedTranscriber, SpeechStreamAdapter, ToneSynthesizer, TranscriptStreamAdapter,
};
use voice_turn_tools::{create_router, system_clock, BookingArbiter, ToolRouter};

use crate::session::SessionRegistry;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub sessions: Arc<SessionRegistry>,
    /// Shared with every session's orchestrator
    pub tools: Arc<ToolRouter>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the default stack: in-memory persistence, the configured planner,
    /// a silent transcriber and the tone synthesizer
    pub fn new(config: Settings) -> Result<Self, ServerError> {
        let planner = create_planner(
            &config.planner,
            Duration::from_millis(config.orchestrator.planning_timeout_ms),
        )?;
        Ok(Self::with_planner(config, planner))
    }

    pub fn with_planner(config: Settings, planner: Arc<dyn Planner>) -> Self {
        let persistence = voice_turn_persistence::in_memory(Utc::now().date_naive());
        let arbiter = Arc::new(BookingArbiter::new(persistence.bookings.clone()));
        let tools = Arc::new(create_router(&persistence, arbiter, &config.booking, system_clock()));

        let orchestrator = TurnOrchestrator::new(
            config.orchestrator.clone(),
            config.vad.clone(),
            TranscriptStreamAdapter::new(
                Arc::new(ScriptedTranscriber::silent()),
                config.transcript.clone(),
            ),
            SpeechStreamAdapter::new(Arc::new(ToneSynthesizer::default()), config.speech.clone()),
            planner,
            tools.clone(),
        );

        let sessions = Arc::new(SessionRegistry::new(orchestrator, &config.sessions));

        Self {
            config: Arc::new(config),
            sessions,
            tools,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
