//! WebSocket Handler
//!
//! Bridges one client connection to one session loop: caller audio and typed
//! text flow in, captions, state changes, utterances and agent audio flow out.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

use voice_turn_agent::{CloseReason, TurnEvent, TurnHandle};
use voice_turn_core::{AudioFrame, SampleRate, Speaker, TurnState};

use crate::state::AppState;
use crate::ServerError;

/// Sample rate of caller audio on the wire
const INPUT_SAMPLE_RATE: SampleRate = SampleRate::Hz16000;

/// Grace period for the event task to flush `session_closed`
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// WebSocket message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// PCM16 little-endian audio, base64 encoded
    Audio { data: String },
    /// Typed input
    Text { content: String },
    /// Partial or final caption
    Caption {
        text: String,
        is_final: bool,
        timestamp: u64,
    },
    /// Turn state update
    State { state: TurnState },
    /// Entry appended to the conversation
    Utterance {
        speaker: Speaker,
        text: String,
        #[serde(default)]
        interrupted: bool,
    },
    BargeIn { timestamp: u64 },
    AudioStalled { last_frame_ms: u64 },
    Error { kind: String, message: String },
    SessionClosed { reason: String },
    Ping,
    Pong,
    /// End session
    EndSession,
}

impl WsMessage {
    /// Client-facing form of a session event; `None` for events not sent
    pub fn from_event(event: TurnEvent) -> Option<Self> {
        let msg = match event {
            TurnEvent::StateChanged { to, .. } => WsMessage::State { state: to },
            TurnEvent::Caption(caption) => WsMessage::Caption {
                text: caption.text,
                is_final: caption.is_final,
                timestamp: caption.timestamp_ms,
            },
            TurnEvent::Utterance(utterance) => WsMessage::Utterance {
                speaker: utterance.speaker,
                text: utterance.text,
                interrupted: utterance.interrupted,
            },
            TurnEvent::Audio(frame) => {
                if frame.samples.is_empty() {
                    return None;
                }
                WsMessage::Audio {
                    data: BASE64.encode(frame.to_pcm16()),
                }
            },
            TurnEvent::BargeIn(signal) => WsMessage::BargeIn {
                timestamp: signal.timestamp_ms,
            },
            TurnEvent::AudioStalled { last_frame_ms } => WsMessage::AudioStalled { last_frame_ms },
            TurnEvent::Error { kind, message } => WsMessage::Error {
                kind: kind.as_str().to_string(),
                message,
            },
            TurnEvent::Closed { reason } => WsMessage::SessionClosed {
                reason: reason.as_str().to_string(),
            },
        };
        Some(msg)
    }

    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize WebSocket message");
                None
            },
        }
    }
}

/// Caller audio arrives as sequential chunks; timestamps accumulate per frame
struct InputClock {
    sequence: u64,
    elapsed_ms: u64,
}

impl InputClock {
    fn new() -> Self {
        Self {
            sequence: 0,
            elapsed_ms: 0,
        }
    }

    fn frame(&mut self, pcm: &[u8]) -> AudioFrame {
        let frame = AudioFrame::from_pcm16(pcm, INPUT_SAMPLE_RATE, self.sequence, self.elapsed_ms);
        self.sequence += 1;
        self.elapsed_ms += frame.duration_ms();
        frame
    }
}

/// WebSocket handler
pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade for an existing session
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
        Path(session_id): Path<String>,
    ) -> Result<Response, ServerError> {
        let session = state
            .sessions
            .get(&session_id)
            .ok_or_else(|| ServerError::SessionNotFound(session_id.clone()))?;

        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, session, state)))
    }

    /// Handle WebSocket connection
    async fn handle_socket(socket: WebSocket, session: TurnHandle, state: AppState) {
        let session_id = session.session_id().to_string();
        tracing::info!(session_id = %session_id, "WebSocket connected");

        let (sender, mut receiver) = socket.split();
        let sender: WsSender = Arc::new(Mutex::new(sender));

        // Subscribe before reporting state so no transition is missed
        let events = session.subscribe();
        send(&sender, &WsMessage::State {
            state: session.state(),
        })
        .await;

        let mut event_task = tokio::spawn(forward_events(events, sender.clone()));

        let mut clock = InputClock::new();
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                    break;
                },
            };

            match msg {
                Message::Text(text) => {
                    let parsed = match serde_json::from_str::<WsMessage>(&text) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            send(&sender, &WsMessage::Error {
                                kind: "validation_error".to_string(),
                                message: format!("Invalid message: {}", e),
                            })
                            .await;
                            continue;
                        },
                    };

                    match parsed {
                        WsMessage::Audio { data } => match BASE64.decode(data.as_bytes()) {
                            Ok(pcm) => push_audio(&session, &mut clock, &pcm),
                            Err(e) => {
                                send(&sender, &WsMessage::Error {
                                    kind: "validation_error".to_string(),
                                    message: format!("Invalid audio payload: {}", e),
                                })
                                .await;
                            },
                        },
                        WsMessage::Text { content } => {
                            if let Err(e) = session.send_text(content).await {
                                tracing::debug!(session_id = %session_id, error = %e, "Text rejected");
                                break;
                            }
                        },
                        WsMessage::Ping => {
                            send(&sender, &WsMessage::Pong).await;
                        },
                        WsMessage::EndSession => {
                            tracing::info!(session_id = %session_id, "Client ended session");
                            break;
                        },
                        other => {
                            tracing::debug!(session_id = %session_id, message = ?other, "Ignoring server-only message");
                        },
                    }
                },
                Message::Binary(pcm) => push_audio(&session, &mut clock, &pcm),
                Message::Ping(payload) => {
                    let mut s = sender.lock().await;
                    let _ = s.send(Message::Pong(payload)).await;
                },
                Message::Pong(_) => {},
                Message::Close(_) => {
                    tracing::info!(session_id = %session_id, "WebSocket closed by client");
                    break;
                },
            }
        }

        state.sessions.remove(&session_id, CloseReason::Disconnect).await;

        if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, &mut event_task).await.is_err() {
            event_task.abort();
        }
        tracing::info!(session_id = %session_id, "WebSocket disconnected");
    }
}

fn push_audio(session: &TurnHandle, clock: &mut InputClock, pcm: &[u8]) {
    if pcm.len() < 2 {
        return;
    }
    if let Err(e) = session.push_audio(clock.frame(pcm)) {
        tracing::debug!(session_id = %session.session_id(), error = %e, "Audio rejected");
    }
}

async fn send(sender: &WsSender, msg: &WsMessage) -> bool {
    let Some(message) = msg.to_message() else {
        return false;
    };
    let mut s = sender.lock().await;
    s.send(message).await.is_ok()
}

/// Forward session events until the session closes or the socket goes away
async fn forward_events(mut events: broadcast::Receiver<TurnEvent>, sender: WsSender) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "WebSocket event forwarder lagged");
                continue;
            },
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let closing = matches!(event, TurnEvent::Closed { .. });
        if let Some(msg) = WsMessage::from_event(event) {
            if !send(&sender, &msg).await {
                break;
            }
        }
        if closing {
            let mut s = sender.lock().await;
            let _ = s.send(Message::Close(None)).await;
            break;
        }
    }
}
