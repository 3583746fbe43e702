//! Tool Router
//!
//! Validates calls against each tool's fixed schema, dispatches with a
//! per-call timeout and records the outcome.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use voice_turn_config::BookingConfig;
use voice_turn_core::{Tool, ToolCall, ToolError, ToolName, ToolOutput, ToolSchema};
use voice_turn_persistence::PersistenceLayer;

use crate::arbiter::BookingArbiter;
use crate::domain_tools::{
    BookViewingTool, Clock, ListSlotsTool, QuoteTotalTool, SearchListingsTool, SendFollowupTool,
};

/// Tool executor trait
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Validate and run one call
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, ToolError>;

    /// List available tools
    fn list_tools(&self) -> Vec<ToolSchema>;

    /// Get tool schema by name
    fn get_tool(&self, name: ToolName) -> Option<ToolSchema>;
}

/// Routes tool calls to their implementations
pub struct ToolRouter {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
    /// Overrides each tool's own timeout when set
    timeout_ms: Option<u64>,
}

impl ToolRouter {
    /// Create a new empty router
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Register a tool, replacing any previous tool of the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name(), Arc::new(tool));
    }

    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn has(&self, name: ToolName) -> bool {
        self.tools.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Parse a raw name and run it; unknown names fail with `MethodNotFound`
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Value,
        session_id: Option<&str>,
    ) -> Result<ToolOutput, ToolError> {
        let mut call = ToolCall::parse(name, arguments).map_err(|e| {
            metrics::counter!(
                "voice_turn_tool_calls_total",
                "tool" => "unknown",
                "outcome" => "invalid"
            )
            .increment(1);
            e
        })?;
        if let Some(session_id) = session_id {
            call = call.for_session(session_id);
        }
        self.execute(&call).await
    }

    /// Fill `session_id` for tools whose schema declares it
    fn bind_session(tool: &dyn Tool, call: &ToolCall) -> Value {
        let mut arguments = call.arguments.clone();
        if let (Some(session_id), Value::Object(map)) = (&call.session_id, &mut arguments) {
            let declared = tool.schema().input_schema.properties.contains_key("session_id");
            if declared && !map.contains_key("session_id") {
                map.insert("session_id".to_string(), Value::String(session_id.clone()));
            }
        }
        arguments
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn record(tool: ToolName, outcome: &'static str) {
    metrics::counter!(
        "voice_turn_tool_calls_total",
        "tool" => tool.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

#[async_trait]
impl ToolExecutor for ToolRouter {
    async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::not_found(format!("Tool not registered: {}", call.name)))?;

        let arguments = Self::bind_session(tool.as_ref(), call);
        if let Err(e) = tool.validate(&arguments) {
            record(call.name, "invalid");
            tracing::warn!(
                tool = call.name.as_str(),
                session_id = ?call.session_id,
                error = %e,
                "Tool arguments rejected"
            );
            return Err(e);
        }

        let timeout_ms = self.timeout_ms.unwrap_or_else(|| tool.timeout_ms());
        tracing::debug!(tool = call.name.as_str(), timeout_ms, "Executing tool");

        match tokio::time::timeout(Duration::from_millis(timeout_ms), tool.execute(arguments)).await {
            Ok(Ok(output)) => {
                record(call.name, "ok");
                Ok(output)
            },
            Ok(Err(e)) => {
                record(call.name, "error");
                tracing::info!(
                    tool = call.name.as_str(),
                    session_id = ?call.session_id,
                    error = %e,
                    "Tool failed"
                );
                Err(e)
            },
            Err(_elapsed) => {
                record(call.name, "timeout");
                tracing::warn!(tool = call.name.as_str(), timeout_ms, "Tool timed out");
                Err(ToolError::timeout(call.name.as_str(), timeout_ms))
            },
        }
    }

    fn list_tools(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    fn get_tool(&self, name: ToolName) -> Option<ToolSchema> {
        self.tools.get(&name).map(|t| t.schema())
    }
}

/// Router with all five tools wired to the persistence layer
pub fn create_router(
    persistence: &PersistenceLayer,
    arbiter: Arc<BookingArbiter>,
    booking: &BookingConfig,
    clock: Clock,
) -> ToolRouter {
    let mut router = ToolRouter::new();

    router.register(SearchListingsTool::new(persistence.listings.clone()));
    router.register(QuoteTotalTool::new(persistence.listings.clone()));
    router.register(
        ListSlotsTool::new(persistence.listings.clone(), arbiter.clone(), booking.clone())
            .with_clock(clock.clone()),
    );
    router.register(
        BookViewingTool::new(
            persistence.listings.clone(),
            persistence.leads.clone(),
            arbiter,
            booking.clone(),
        )
        .with_clock(clock),
    );
    router.register(SendFollowupTool::new(
        persistence.leads.clone(),
        persistence.followups.clone(),
    ));

    tracing::info!(tool_count = router.len(), "Created tool router");
    router
}
