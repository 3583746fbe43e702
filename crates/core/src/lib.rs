//! Core traits and types for the voice-turn orchestrator
//!
//! This crate provides foundational types used across all other crates:
//! - Audio frames on the session media clock
//! - Captions, voice activity edges and barge-in signals
//! - Turn states, utterances and the bounded context ring
//! - The error taxonomy shared by every session
//! - Port traits for transcription, synthesis, planning and tools

pub mod activity;
pub mod audio;
pub mod conversation;
pub mod error;
pub mod traits;
pub mod transcript;

pub use activity::{BargeInSignal, VadEdge, VadSignal};
pub use audio::{AudioFrame, SampleRate, SILENCE_DB};
pub use conversation::{Speaker, ToolPayload, TurnState, Utterance, UtteranceRing};
pub use error::{Error, ErrorKind, PipelineError, Result};
pub use transcript::{CaptionEvent, TranscriptFrame};

pub use traits::{
    validate_object, validate_property, AudioStream, ContentBlock, ErrorCode, InputSchema, Plan,
    PlannedCall, Planner, PropertySchema, SpeechChunk, SpeechChunkStream, Synthesizer, Tool,
    ToolCall, ToolError, ToolName, ToolOutput, ToolSchema, Transcriber, TranscriptStream,
};
