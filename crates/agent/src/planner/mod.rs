//! Planning port implementations
//!
//! - `RulePlanner`: keyword intents over the utterance window, used when no
//!   remote planner is configured
//! - `HttpPlanner`: remote planning service over HTTP

mod extract;
mod http;
mod rules;

pub use extract::{RequestExtractor, SearchCriteria, VisitorContact};
pub use http::HttpPlanner;
pub use rules::RulePlanner;

use std::sync::Arc;
use std::time::Duration;

use voice_turn_config::PlannerConfig;
use voice_turn_core::{Planner, Result};

/// Remote planner when an endpoint is configured, rules otherwise
pub fn create_planner(config: &PlannerConfig, timeout: Duration) -> Result<Arc<dyn Planner>> {
    match HttpPlanner::from_config(config, timeout)? {
        Some(planner) => {
            tracing::info!(endpoint = ?config.endpoint, "Using remote planner");
            Ok(Arc::new(planner))
        },
        None => {
            tracing::info!("No planner endpoint configured, using rule planner");
            Ok(Arc::new(RulePlanner::new()))
        },
    }
}
