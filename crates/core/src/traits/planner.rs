//! Planning port: utterance window in, ordered plan out

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::Utterance;
use crate::error::Result;

/// One tool invocation proposed by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl PlannedCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Zero or more tool calls followed by reply text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub tool_calls: Vec<PlannedCall>,
    #[serde(default)]
    pub reply: String,
}

impl Plan {
    /// A plan with no tool calls
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            tool_calls: Vec::new(),
            reply: text.into(),
        }
    }

    pub fn with_call(mut self, call: PlannedCall) -> Self {
        self.tool_calls.push(call);
        self
    }
}

/// Proposes the next turn from the rolling utterance window
///
/// Failures should use `Error::UpstreamTimeout` or `Error::UpstreamDisconnect`.
/// The orchestrator applies its own deadline on top of whatever the
/// implementation does.
#[async_trait]
pub trait Planner: Send + Sync + 'static {
    async fn plan(&self, session_id: &str, context: &[Utterance]) -> Result<Plan>;

    /// Get planner name for logging
    fn name(&self) -> &str;
}
