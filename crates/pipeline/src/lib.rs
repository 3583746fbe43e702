//! Streaming audio pipeline for the voice-turn orchestrator
//!
//! Features:
//! - Edge-triggered voice activity monitor with a stall watchdog
//! - Transcript stream adapter with ordering and reconnect/backoff
//! - Cancellable speech stream adapter with realtime pacing
//! - Scripted transcriber and tone synthesizer for local runs

pub mod stt;
pub mod tts;
pub mod vad;

pub use stt::{
    ScriptedConnection, ScriptedTranscriber, TranscriptEvent, TranscriptHandle,
    TranscriptStreamAdapter,
};
pub use tts::{SpeechControl, SpeechFrame, SpeechStream, SpeechStreamAdapter, ToneSynthesizer};
pub use vad::{monitor_stream, StallNotice, VoiceActivityMonitor};
