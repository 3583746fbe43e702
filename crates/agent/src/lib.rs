//! Turn orchestration for voice sessions
//!
//! Features:
//! - Per-session event loop over caller audio, captions and speech
//! - Barge-in that cancels speech mid-utterance
//! - Planning with a bounded deadline, then ordered tool dispatch
//! - Grounded reply rendering from tool payloads
//! - Rule-based and HTTP planners

pub mod planner;
pub mod render;
pub mod turn;

pub use planner::{create_planner, HttpPlanner, RequestExtractor, RulePlanner};
pub use render::{failure_payload, render_payload, render_reply};
pub use turn::{CloseReason, SessionMetrics, SessionSnapshot, TurnEvent, TurnHandle, TurnOrchestrator};
