//! Turn orchestrator and per-session handles

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use voice_turn_config::{OrchestratorConfig, VadConfig};
use voice_turn_core::{AudioFrame, Error, Planner, Result, TurnState, Utterance};
use voice_turn_pipeline::{SpeechStreamAdapter, TranscriptStreamAdapter, VoiceActivityMonitor};
use voice_turn_tools::ToolExecutor;

use super::driver::{SessionDriver, SessionParts};
use super::events::{CloseReason, TurnCommand, TurnEvent};
use super::metrics::SessionMetrics;

/// Caller audio buffered ahead of the session loop (about 5 s of 20 ms frames)
const AUDIO_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 32;

/// State the session loop publishes for readers outside it
pub(crate) struct SessionShared {
    pub(crate) metrics: Mutex<SessionMetrics>,
    pub(crate) window: Mutex<Vec<Utterance>>,
    /// Utterances ever appended, including those rolled out of the window
    pub(crate) utterance_count: AtomicU64,
    pub(crate) audio_stalled: AtomicBool,
    pub(crate) last_activity: Mutex<Instant>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            metrics: Mutex::new(SessionMetrics::default()),
            window: Mutex::new(Vec::new()),
            utterance_count: AtomicU64::new(0),
            audio_stalled: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: TurnState,
    pub utterance_count: u64,
    pub audio_stalled: bool,
    pub created_at: DateTime<Utc>,
    pub metrics: SessionMetrics,
}

/// Builds one session loop per call from shared adapters and ports
#[derive(Clone)]
pub struct TurnOrchestrator {
    config: OrchestratorConfig,
    vad: VadConfig,
    transcripts: TranscriptStreamAdapter,
    speech: SpeechStreamAdapter,
    planner: Arc<dyn Planner>,
    tools: Arc<dyn ToolExecutor>,
}

impl TurnOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        vad: VadConfig,
        transcripts: TranscriptStreamAdapter,
        speech: SpeechStreamAdapter,
        planner: Arc<dyn Planner>,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        let speech = speech.with_start_timeout(Duration::from_millis(config.speech_start_timeout_ms));
        Self {
            config,
            vad,
            transcripts,
            speech,
            planner,
            tools,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Spawn the session loop; the session starts in `Listening`
    pub fn start(&self, session_id: &str) -> TurnHandle {
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_BUFFER);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(self.config.event_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(TurnState::Listening);
        let shared = Arc::new(SessionShared::new());

        let driver = SessionDriver::new(SessionParts {
            session_id: session_id.to_string(),
            config: self.config.clone(),
            state_tx,
            events: event_tx.clone(),
            shared: shared.clone(),
            vad: VoiceActivityMonitor::new(&self.vad),
            transcript: self.transcripts.start(session_id),
            speech_adapter: self.speech.clone(),
            planner: self.planner.clone(),
            tools: self.tools.clone(),
        });
        tokio::spawn(driver.run(audio_rx, command_rx));

        tracing::info!(session_id, planner = self.planner.name(), "Session loop started");

        TurnHandle {
            session_id: session_id.to_string(),
            created_at: Utc::now(),
            audio_tx,
            command_tx,
            event_tx,
            state_rx,
            shared,
        }
    }
}

/// Cloneable handle to one running session
#[derive(Clone)]
pub struct TurnHandle {
    session_id: String,
    created_at: DateTime<Utc>,
    audio_tx: mpsc::Sender<AudioFrame>,
    command_tx: mpsc::Sender<TurnCommand>,
    event_tx: broadcast::Sender<TurnEvent>,
    state_rx: watch::Receiver<TurnState>,
    shared: Arc<SessionShared>,
}

impl TurnHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> TurnState {
        *self.state_rx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == TurnState::Closed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.event_tx.subscribe()
    }

    /// Watch state changes
    pub fn state_watch(&self) -> watch::Receiver<TurnState> {
        self.state_rx.clone()
    }

    /// Queue one caller frame without waiting; a full buffer drops it
    pub fn push_audio(&self, frame: AudioFrame) -> Result<()> {
        match self.audio_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    sequence = frame.sequence,
                    "Session audio buffer full, dropping frame"
                );
                Ok(())
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(Error::SessionClosed(self.session_id.clone()))
            },
        }
    }

    /// Typed input, treated exactly like a final caption
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.command_tx
            .send(TurnCommand::Text(text.into()))
            .await
            .map_err(|_| Error::SessionClosed(self.session_id.clone()))
    }

    /// Ask the loop to close and wait until it has
    pub async fn close(&self, reason: CloseReason) {
        // a send error means the loop is already gone
        let _ = self.command_tx.send(TurnCommand::Close(reason)).await;
        self.closed().await;
    }

    /// Resolves once the session has reached `Closed`
    pub async fn closed(&self) {
        let mut state = self.state_rx.clone();
        // the sender drops with the loop, which only happens after Closed
        let _ = state.wait_for(|s| *s == TurnState::Closed).await;
    }

    /// Time since the last caller audio, caption or command
    pub fn idle_for(&self) -> Duration {
        self.shared.last_activity.lock().elapsed()
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.shared.window.lock().clone()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.shared.metrics.lock().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            state: self.state(),
            utterance_count: self.shared.utterance_count.load(Ordering::Relaxed),
            audio_stalled: self.shared.audio_stalled.load(Ordering::Relaxed),
            created_at: self.created_at,
            metrics: self.metrics(),
        }
    }
}
