//! Transcript types

use serde::{Deserialize, Serialize};

/// Raw caption as produced by a transcription vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFrame {
    pub text: String,
    pub is_final: bool,
    /// Media-clock time the caption refers to
    pub timestamp_ms: u64,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl TranscriptFrame {
    pub fn partial(text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            timestamp_ms,
            confidence: default_confidence(),
        }
    }

    pub fn final_text(text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            timestamp_ms,
            confidence: default_confidence(),
        }
    }
}

/// Normalized caption delivered to the orchestrator and the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionEvent {
    pub session_id: String,
    pub text: String,
    pub is_final: bool,
    pub timestamp_ms: u64,
}

impl CaptionEvent {
    pub fn from_frame(session_id: &str, frame: TranscriptFrame) -> Self {
        Self {
            session_id: session_id.to_string(),
            text: frame.text,
            is_final: frame.is_final,
            timestamp_ms: frame.timestamp_ms,
        }
    }
}
