//! Turn orchestration
//!
//! One session loop per call drives the turn state machine:
//! `Listening -> Planning -> ToolDispatch -> Speaking -> Listening`, with
//! barge-in returning `Speaking` straight to `Listening` and any state able
//! to reach `Closed`.

mod driver;
mod events;
mod metrics;
mod orchestrator;

pub use events::{CloseReason, TurnEvent};
pub use metrics::SessionMetrics;
pub use orchestrator::{SessionSnapshot, TurnHandle, TurnOrchestrator};
