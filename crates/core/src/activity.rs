//! Voice activity edges and barge-in signals

use serde::{Deserialize, Serialize};

/// Edge emitted by the voice activity monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadEdge {
    Start,
    Stop,
}

impl VadEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            VadEdge::Start => "start",
            VadEdge::Stop => "stop",
        }
    }
}

/// A timed voice activity edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadSignal {
    pub edge: VadEdge,
    pub timestamp_ms: u64,
    /// Synthetic stop raised by the watchdog because audio stopped arriving
    #[serde(default)]
    pub stalled: bool,
}

impl VadSignal {
    pub fn start(timestamp_ms: u64) -> Self {
        Self {
            edge: VadEdge::Start,
            timestamp_ms,
            stalled: false,
        }
    }

    pub fn stop(timestamp_ms: u64) -> Self {
        Self {
            edge: VadEdge::Stop,
            timestamp_ms,
            stalled: false,
        }
    }

    pub fn stalled(timestamp_ms: u64) -> Self {
        Self {
            edge: VadEdge::Stop,
            timestamp_ms,
            stalled: true,
        }
    }
}

/// Caller started talking over the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BargeInSignal {
    pub session_id: String,
    pub timestamp_ms: u64,
}
