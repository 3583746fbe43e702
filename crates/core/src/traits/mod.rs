//! Port traits for the voice-turn orchestrator
//!
//! ```text
//! Speech:
//!   - Transcriber: audio frames -> caption stream (one connection per open)
//!   - Synthesizer: reply text -> audio chunk stream
//!
//! Planning:
//!   - Planner: utterance window -> ordered tool calls + reply text
//!
//! Tools:
//!   - Tool: schema-validated, grounded-data tool
//! ```

mod planner;
mod speech;
mod tool;

pub use planner::{Plan, PlannedCall, Planner};
pub use speech::{
    AudioStream, SpeechChunk, SpeechChunkStream, Synthesizer, Transcriber, TranscriptStream,
};
pub use tool::{
    validate_object, validate_property, ContentBlock, ErrorCode, InputSchema, PropertySchema,
    Tool, ToolCall, ToolError, ToolName, ToolOutput, ToolSchema,
};
