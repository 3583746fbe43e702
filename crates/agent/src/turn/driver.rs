//! Single-consumer session loop
//!
//! Every input for one call (caller audio, captions, planner and tool
//! progress, speech frames, watchdog ticks and commands) is funnelled into
//! one `select!` loop, so the state machine sees a single ordered stream of
//! events and owns its state outright.
//!
//! ```text
//! audio ──▶ VAD ──(start edge while Speaking)──▶ stop speech ──▶ Listening
//!   │
//!   └────▶ transcript ──(final)──▶ Planning ──▶ ToolDispatch ──▶ Speaking
//! ```

use std::future::pending;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use voice_turn_config::constants::phrases;
use voice_turn_config::OrchestratorConfig;
use voice_turn_core::{
    AudioFrame, BargeInSignal, CaptionEvent, Error, PipelineError, Plan, PlannedCall, Planner,
    ToolCall, ToolError, ToolOutput, ToolPayload, TurnState, Utterance, UtteranceRing, VadEdge,
    VadSignal,
};
use voice_turn_pipeline::{
    SpeechFrame, SpeechStream, SpeechStreamAdapter, TranscriptEvent, TranscriptHandle,
    VoiceActivityMonitor,
};
use voice_turn_tools::ToolExecutor;

use super::events::{CloseReason, TurnCommand, TurnEvent};
use super::orchestrator::SessionShared;
use crate::render::{failure_payload, render_payload, render_reply};

/// Shortest watchdog poll
const MIN_WATCHDOG_TICK: Duration = Duration::from_millis(20);

/// Progress reported by a turn worker
enum TurnProgress {
    Planned(Plan),
    PlanningFailed(Error),
    ToolFinished {
        call: PlannedCall,
        outcome: Result<ToolOutput, ToolError>,
    },
    Finished,
}

/// Planning and tool dispatch for the current turn
struct TurnInFlight {
    worker: JoinHandle<()>,
    progress: mpsc::Receiver<TurnProgress>,
    reply: String,
    results: Vec<ToolPayload>,
    /// Final caption arrival, for turn latency
    started_at: Instant,
}

/// Reply currently being spoken
struct ActiveSpeech {
    stream: SpeechStream,
    text: String,
    /// Characters spoken so far, when the synthesizer reports it
    spoken_chars: Option<usize>,
    /// Cleared once the first frame has gone out
    turn_started: Option<Instant>,
}

/// Per-session inputs the orchestrator hands to a new loop
pub(crate) struct SessionParts {
    pub(crate) session_id: String,
    pub(crate) config: OrchestratorConfig,
    pub(crate) state_tx: watch::Sender<TurnState>,
    pub(crate) events: broadcast::Sender<TurnEvent>,
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) vad: VoiceActivityMonitor,
    pub(crate) transcript: TranscriptHandle,
    pub(crate) speech_adapter: SpeechStreamAdapter,
    pub(crate) planner: Arc<dyn Planner>,
    pub(crate) tools: Arc<dyn ToolExecutor>,
}

pub(crate) struct SessionDriver {
    session_id: String,
    config: OrchestratorConfig,
    state: TurnState,
    state_tx: watch::Sender<TurnState>,
    events: broadcast::Sender<TurnEvent>,
    shared: Arc<SessionShared>,
    ring: UtteranceRing,
    vad: VoiceActivityMonitor,
    transcript: Option<TranscriptHandle>,
    speech_adapter: SpeechStreamAdapter,
    planner: Arc<dyn Planner>,
    tools: Arc<dyn ToolExecutor>,
    /// Finals that arrived while a turn was in progress
    queued_finals: Vec<String>,
    turn: Option<TurnInFlight>,
    speech: Option<ActiveSpeech>,
    /// Media clock of the latest caller frame
    input_ms: u64,
    /// Media clock of the latest reply frame
    output_ms: u64,
}

impl SessionDriver {
    /// Idle driver in `Listening`
    pub(crate) fn new(parts: SessionParts) -> Self {
        Self {
            ring: UtteranceRing::new(parts.config.context_window),
            session_id: parts.session_id,
            config: parts.config,
            state: TurnState::Listening,
            state_tx: parts.state_tx,
            events: parts.events,
            shared: parts.shared,
            vad: parts.vad,
            transcript: Some(parts.transcript),
            speech_adapter: parts.speech_adapter,
            planner: parts.planner,
            tools: parts.tools,
            queued_finals: Vec::new(),
            turn: None,
            speech: None,
            input_ms: 0,
            output_ms: 0,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut audio_rx: mpsc::Receiver<AudioFrame>,
        mut command_rx: mpsc::Receiver<TurnCommand>,
    ) {
        let mut watchdog = interval((self.vad.watchdog() / 4).max(MIN_WATCHDOG_TICK));
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                biased;

                command = command_rx.recv() => match command {
                    Some(TurnCommand::Close(reason)) => break reason,
                    Some(TurnCommand::Text(text)) => self.on_typed_text(text),
                    None => break CloseReason::Disconnect,
                },

                Some(frame) = audio_rx.recv() => self.on_audio(frame),

                event = next_transcript(&mut self.transcript) => self.on_transcript(event),

                progress = next_progress(&mut self.turn) => self.on_progress(progress),

                frame = next_speech(&mut self.speech) => self.on_speech(frame),

                _ = watchdog.tick() => self.on_watchdog(),
            }
        };

        self.shutdown(reason);
    }

    fn emit(&self, event: TurnEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn transition(&mut self, to: TurnState) {
        let from = self.state;
        if from == to {
            return;
        }
        if !from.can_transition_to(to) {
            tracing::error!(
                session_id = %self.session_id,
                from = from.as_str(),
                to = to.as_str(),
                "Illegal turn transition ignored"
            );
            return;
        }

        self.state = to;
        self.state_tx.send_replace(to);
        tracing::debug!(
            session_id = %self.session_id,
            from = from.as_str(),
            to = to.as_str(),
            "Turn state changed"
        );
        self.emit(TurnEvent::StateChanged { from, to });
    }

    fn push_utterance(&mut self, utterance: Utterance) {
        self.ring.push(utterance.clone());
        *self.shared.window.lock() = self.ring.snapshot();
        self.shared
            .utterance_count
            .store(self.ring.total_appended(), Ordering::Relaxed);
        self.emit(TurnEvent::Utterance(utterance));
    }

    fn report(&self, error: &Error) {
        self.emit(TurnEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    // ---- caller input ----

    fn on_audio(&mut self, frame: AudioFrame) {
        self.shared.touch();
        self.input_ms = frame.end_ms();
        if self.shared.audio_stalled.swap(false, Ordering::Relaxed) {
            tracing::info!(session_id = %self.session_id, "Caller audio resumed");
        }

        if let Some(transcript) = &self.transcript {
            if let Err(e) = transcript.push(frame.clone()) {
                tracing::debug!(session_id = %self.session_id, error = %e, "Transcript input closed");
            }
        }

        if let Some(signal) = self.vad.process(&frame) {
            self.on_vad(signal);
        }
    }

    fn on_vad(&mut self, signal: VadSignal) {
        match signal.edge {
            VadEdge::Start => {
                self.shared.metrics.lock().vad_start_count += 1;
                match self.state {
                    TurnState::Speaking if self.config.barge_in_enabled => {
                        self.barge_in(signal.timestamp_ms)
                    },
                    TurnState::Planning | TurnState::ToolDispatch => {
                        tracing::debug!(
                            session_id = %self.session_id,
                            state = self.state.as_str(),
                            "Caller spoke during a non-interruptible state"
                        );
                    },
                    _ => {},
                }
            },
            VadEdge::Stop => {
                self.shared.metrics.lock().vad_end_count += 1;
            },
        }
    }

    fn on_typed_text(&mut self, text: String) {
        self.shared.touch();
        let caption = CaptionEvent {
            session_id: self.session_id.clone(),
            text: text.clone(),
            is_final: true,
            timestamp_ms: self.input_ms,
        };
        self.emit(TurnEvent::Caption(caption));
        self.on_final(text);
    }

    fn on_transcript(&mut self, event: Option<TranscriptEvent>) {
        match event {
            Some(TranscriptEvent::Caption(caption)) => {
                self.shared.touch();
                let final_text = caption.is_final.then(|| caption.text.clone());
                self.emit(TurnEvent::Caption(caption));
                if let Some(text) = final_text {
                    self.on_final(text);
                }
            },
            Some(TranscriptEvent::Reconnecting { attempt, delay_ms }) => {
                tracing::info!(
                    session_id = %self.session_id,
                    attempt,
                    delay_ms,
                    "Transcriber reconnecting"
                );
            },
            Some(TranscriptEvent::Failed(e)) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Transcriber gave up");
                self.report(&Error::from(e));
                self.transcript = None;
            },
            None => {
                tracing::warn!(session_id = %self.session_id, "Transcript stream ended");
                self.transcript = None;
            },
        }
    }

    fn on_final(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        if self.state == TurnState::Listening && self.turn.is_none() {
            self.start_turn(text);
        } else {
            tracing::debug!(
                session_id = %self.session_id,
                state = self.state.as_str(),
                queued = self.queued_finals.len() + 1,
                "Final caption queued for the next turn"
            );
            self.queued_finals.push(text);
        }
    }

    // ---- planning and dispatch ----

    fn start_turn(&mut self, text: String) {
        self.push_utterance(Utterance::user(text));
        self.transition(TurnState::Planning);

        let (tx, rx) = mpsc::channel(8);
        let worker = TurnWorker {
            session_id: self.session_id.clone(),
            context: self.ring.snapshot(),
            planner: self.planner.clone(),
            tools: self.tools.clone(),
            planning_timeout_ms: self.config.planning_timeout_ms,
            tool_timeout_ms: self.config.tool_timeout_ms,
        };

        self.turn = Some(TurnInFlight {
            worker: tokio::spawn(worker.run(tx)),
            progress: rx,
            reply: String::new(),
            results: Vec::new(),
            started_at: Instant::now(),
        });
    }

    fn on_progress(&mut self, progress: Option<TurnProgress>) {
        match progress {
            Some(TurnProgress::Planned(plan)) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    tool_calls = plan.tool_calls.len(),
                    "Plan received"
                );
                if !plan.tool_calls.is_empty() {
                    self.transition(TurnState::ToolDispatch);
                }
                if let Some(turn) = self.turn.as_mut() {
                    turn.reply = plan.reply;
                }
            },
            Some(TurnProgress::ToolFinished { call, outcome }) => self.on_tool_finished(call, outcome),
            Some(TurnProgress::Finished) => self.finish_turn(),
            Some(TurnProgress::PlanningFailed(error)) => self.fail_planning(error),
            None => self.fail_planning(Error::Internal("turn worker stopped".to_string())),
        }
    }

    fn on_tool_finished(&mut self, call: PlannedCall, outcome: Result<ToolOutput, ToolError>) {
        let payload = match outcome {
            Ok(output) => ToolPayload {
                tool: call.name,
                arguments: call.arguments,
                ok: !output.is_error,
                result: output.to_value(),
            },
            Err(e) => {
                let message = e.message.clone();
                let error = Error::from(e);
                tracing::info!(
                    session_id = %self.session_id,
                    tool = %call.name,
                    kind = error.kind().as_str(),
                    error = %message,
                    "Tool call failed, continuing turn"
                );
                ToolPayload {
                    tool: call.name,
                    arguments: call.arguments,
                    ok: false,
                    result: failure_payload(error.kind(), &message),
                }
            },
        };

        let text = render_payload(&payload);
        self.push_utterance(Utterance::tool(text, payload.clone()));
        if let Some(turn) = self.turn.as_mut() {
            turn.results.push(payload);
        }
    }

    fn fail_planning(&mut self, error: Error) {
        if let Some(turn) = self.turn.take() {
            turn.worker.abort();
        }
        metrics::counter!("voice_turn_planning_failures_total").increment(1);
        tracing::warn!(
            session_id = %self.session_id,
            planner = self.planner.name(),
            kind = error.kind().as_str(),
            error = %error,
            "Planning failed"
        );

        self.report(&error);
        self.push_utterance(Utterance::agent(phrases::PLANNING_APOLOGY));
        self.transition(TurnState::Listening);
        self.resume_listening();
    }

    fn finish_turn(&mut self) {
        let Some(turn) = self.turn.take() else {
            return;
        };

        let reply = render_reply(&self.session_id, &turn.reply, &self.ring.snapshot(), &turn.results);
        if reply.trim().is_empty() {
            self.transition(TurnState::Listening);
            self.resume_listening();
            return;
        }

        self.transition(TurnState::Speaking);
        let stream = self.speech_adapter.speak(&reply, self.output_ms);
        self.speech = Some(ActiveSpeech {
            stream,
            text: reply,
            spoken_chars: None,
            turn_started: Some(turn.started_at),
        });
    }

    /// Start the next turn from captions that arrived mid-turn
    fn resume_listening(&mut self) {
        if self.state != TurnState::Listening || self.queued_finals.is_empty() {
            return;
        }
        let text = self.queued_finals.drain(..).collect::<Vec<_>>().join(" ");
        self.start_turn(text);
    }

    // ---- speaking ----

    fn on_speech(&mut self, frame: Option<Result<SpeechFrame, PipelineError>>) {
        match frame {
            Some(Ok(speech_frame)) => {
                let Some(active) = self.speech.as_mut() else {
                    return;
                };
                if let Some(offset) = speech_frame.text_offset {
                    active.spoken_chars = Some(offset);
                }
                if let Some(started) = active.turn_started.take() {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.shared.metrics.lock().record_latency(latency_ms);
                }
                self.output_ms = speech_frame.frame.end_ms();
                self.emit(TurnEvent::Audio(speech_frame.frame));
            },
            Some(Err(e)) => {
                if let Some(active) = self.speech.take() {
                    active.stream.stop();
                }
                tracing::warn!(session_id = %self.session_id, error = %e, "Speech synthesis failed");
                self.report(&Error::from(e));
                self.push_utterance(Utterance::agent(phrases::SPEECH_APOLOGY));
                self.transition(TurnState::Listening);
                self.resume_listening();
            },
            None => {
                if let Some(active) = self.speech.take() {
                    self.push_utterance(Utterance::agent(active.text));
                }
                self.transition(TurnState::Listening);
                self.resume_listening();
            },
        }
    }

    fn barge_in(&mut self, timestamp_ms: u64) {
        let Some(active) = self.speech.take() else {
            return;
        };

        {
            let mut metrics = self.shared.metrics.lock();
            if active.stream.stop() {
                metrics.tts_stop_count += 1;
            }
            metrics.barge_in_count += 1;
        }
        metrics::counter!("voice_turn_barge_in_total").increment(1);

        tracing::info!(
            session_id = %self.session_id,
            timestamp_ms,
            spoken_chars = ?active.spoken_chars,
            reply_chars = active.text.chars().count(),
            "Barge-in, speech stopped"
        );

        self.push_utterance(Utterance::interrupted_agent(interrupted_text(
            &active.text,
            active.spoken_chars,
        )));
        self.emit(TurnEvent::BargeIn(BargeInSignal {
            session_id: self.session_id.clone(),
            timestamp_ms,
        }));
        self.transition(TurnState::Listening);
        self.resume_listening();
    }

    // ---- housekeeping ----

    fn on_watchdog(&mut self) {
        let Some(notice) = self.vad.check_stall(Instant::now()) else {
            return;
        };

        if notice.synthetic_stop.is_some() {
            self.shared.metrics.lock().vad_end_count += 1;
        }
        self.shared.audio_stalled.store(true, Ordering::Relaxed);
        self.emit(TurnEvent::AudioStalled {
            last_frame_ms: notice.last_frame_ms,
        });
    }

    fn shutdown(mut self, reason: CloseReason) {
        if let Some(turn) = self.turn.take() {
            turn.worker.abort();
        }
        if let Some(active) = self.speech.take() {
            if active.stream.stop() {
                self.shared.metrics.lock().tts_stop_count += 1;
            }
        }
        if let Some(transcript) = self.transcript.take() {
            transcript.close();
        }
        self.queued_finals.clear();
        self.vad.reset();

        self.transition(TurnState::Closed);
        self.emit(TurnEvent::Closed { reason });
        tracing::info!(
            session_id = %self.session_id,
            reason = reason.as_str(),
            utterances = self.ring.total_appended(),
            "Session closed"
        );
    }
}

async fn next_transcript(transcript: &mut Option<TranscriptHandle>) -> Option<TranscriptEvent> {
    match transcript {
        Some(handle) => handle.recv().await,
        None => pending().await,
    }
}

async fn next_progress(turn: &mut Option<TurnInFlight>) -> Option<TurnProgress> {
    match turn {
        Some(turn) => turn.progress.recv().await,
        None => pending().await,
    }
}

async fn next_speech(
    speech: &mut Option<ActiveSpeech>,
) -> Option<Result<SpeechFrame, PipelineError>> {
    match speech {
        Some(active) => active.stream.next_frame().await,
        None => pending().await,
    }
}

/// Runs the planner and then each planned call, in order, off the loop
struct TurnWorker {
    session_id: String,
    context: Vec<Utterance>,
    planner: Arc<dyn Planner>,
    tools: Arc<dyn ToolExecutor>,
    planning_timeout_ms: u64,
    tool_timeout_ms: u64,
}

impl TurnWorker {
    async fn run(self, tx: mpsc::Sender<TurnProgress>) {
        let planning = tokio::time::timeout(
            Duration::from_millis(self.planning_timeout_ms),
            self.planner.plan(&self.session_id, &self.context),
        )
        .await;

        let plan = match planning {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => {
                let _ = tx.send(TurnProgress::PlanningFailed(e)).await;
                return;
            },
            Err(_elapsed) => {
                let error = Error::UpstreamTimeout(format!(
                    "planner {} gave no plan within {} ms",
                    self.planner.name(),
                    self.planning_timeout_ms
                ));
                let _ = tx.send(TurnProgress::PlanningFailed(error)).await;
                return;
            },
        };

        let calls = plan.tool_calls.clone();
        if tx.send(TurnProgress::Planned(plan)).await.is_err() {
            return;
        }

        for call in calls {
            let outcome = self.dispatch(&call).await;
            if tx.send(TurnProgress::ToolFinished { call, outcome }).await.is_err() {
                return;
            }
        }

        let _ = tx.send(TurnProgress::Finished).await;
    }

    async fn dispatch(&self, call: &PlannedCall) -> Result<ToolOutput, ToolError> {
        let parsed = ToolCall::parse(&call.name, call.arguments.clone())?.for_session(&self.session_id);
        match tokio::time::timeout(
            Duration::from_millis(self.tool_timeout_ms),
            self.tools.execute(&parsed),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    tool = %call.name,
                    timeout_ms = self.tool_timeout_ms,
                    "Tool call timed out"
                );
                Err(ToolError::timeout(&call.name, self.tool_timeout_ms))
            },
        }
    }
}

/// What the caller heard before cutting in, then the marker
///
/// Without a progress report the whole reply is assumed heard.
fn interrupted_text(reply: &str, spoken_chars: Option<usize>) -> String {
    let spoken: String = match spoken_chars {
        Some(chars) => reply.chars().take(chars).collect(),
        None => reply.to_string(),
    };
    let spoken = spoken.trim_end();
    if spoken.is_empty() {
        phrases::INTERRUPTED_MARKER.to_string()
    } else {
        format!("{} {}", spoken, phrases::INTERRUPTED_MARKER)
    }
}
