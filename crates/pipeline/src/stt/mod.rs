//! Speech-to-text side of the pipeline
//!
//! - `TranscriptStreamAdapter`: reconnecting, order-enforcing caption stream
//! - `ScriptedTranscriber`: local transcriber used in development and tests

mod adapter;
mod scripted;

pub use adapter::{TranscriptEvent, TranscriptHandle, TranscriptStreamAdapter};
pub use scripted::{ScriptedConnection, ScriptedTranscriber};
