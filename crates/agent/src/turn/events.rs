//! Events broadcast by a running session

use serde::Serialize;

use voice_turn_core::{AudioFrame, BargeInSignal, CaptionEvent, ErrorKind, TurnState, Utterance};

/// Why a session reached `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Caller hung up or asked to end
    Disconnect,
    /// Evicted by the registry for inactivity
    IdleTimeout,
    /// Process is going down
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Disconnect => "disconnect",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Session event, in the order the session's loop produced it
#[derive(Debug, Clone)]
pub enum TurnEvent {
    StateChanged { from: TurnState, to: TurnState },
    /// Partial or final caption
    Caption(CaptionEvent),
    /// Appended to the rolling window
    Utterance(Utterance),
    /// Agent speech output
    Audio(AudioFrame),
    BargeIn(BargeInSignal),
    /// Caller audio stopped arriving
    AudioStalled { last_frame_ms: u64 },
    /// Recovered failure, reported to the client
    Error { kind: ErrorKind, message: String },
    Closed { reason: CloseReason },
}

/// Control messages into the session loop
#[derive(Debug)]
pub(crate) enum TurnCommand {
    /// Typed input, handled as a final caption
    Text(String),
    Close(CloseReason),
}
