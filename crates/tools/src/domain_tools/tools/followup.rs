//! Follow-up Tool
//!
//! Queues an SMS or email to a lead in the outbox.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use voice_turn_core::{InputSchema, PropertySchema, Tool, ToolError, ToolName, ToolOutput, ToolSchema};
use voice_turn_persistence::{FollowupChannel, FollowupMessage, FollowupSender, LeadStage, LeadStore};

use super::super::utils::{str_arg, tool_error};

const DEFAULT_BODY: &str =
    "Thanks for your interest. Reply to this message and we will help you arrange a viewing.";

pub struct SendFollowupTool {
    leads: Arc<dyn LeadStore>,
    sender: Arc<dyn FollowupSender>,
}

impl SendFollowupTool {
    pub fn new(leads: Arc<dyn LeadStore>, sender: Arc<dyn FollowupSender>) -> Self {
        Self { leads, sender }
    }
}

#[async_trait]
impl Tool for SendFollowupTool {
    fn name(&self) -> ToolName {
        ToolName::SendFollowup
    }

    fn description(&self) -> &str {
        "Send a follow-up SMS or email to a lead"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object()
                .property("lead_id", PropertySchema::string("Lead identifier"), true)
                .property(
                    "channel",
                    PropertySchema::enum_type(
                        "Delivery channel",
                        vec!["sms".to_string(), "email".to_string()],
                    ),
                    true,
                )
                .property("message", PropertySchema::string("Message body"), false),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let lead_id = Uuid::parse_str(str_arg(&input, "lead_id")?)
            .map_err(|_| ToolError::invalid_params("lead_id must be a UUID"))?;
        let channel = match str_arg(&input, "channel")? {
            "sms" => FollowupChannel::Sms,
            "email" => FollowupChannel::Email,
            other => {
                return Err(ToolError::invalid_params(format!(
                    "channel must be 'sms' or 'email', got '{}'",
                    other
                )))
            },
        };
        let body = input
            .get("message")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_BODY);

        let lead = self
            .leads
            .get(lead_id)
            .await
            .map_err(|e| tool_error(e.into()))?
            .ok_or_else(|| ToolError::missing_record(format!("Unknown lead: {}", lead_id)))?;

        let recipient = match channel {
            FollowupChannel::Sms => lead.phone.as_deref(),
            FollowupChannel::Email => lead.email.as_deref(),
        }
        .ok_or_else(|| {
            ToolError::invalid_params(format!("Lead has no {} contact", channel.as_str()))
        })?;

        let message = FollowupMessage::new(lead_id, channel, recipient, body);
        let message_id = message.message_id;
        self.sender
            .send(message)
            .await
            .map_err(|e| tool_error(e.into()))?;

        // forward-only, so a booked lead stays booked
        self.leads
            .advance_stage(lead_id, LeadStage::Engaged)
            .await
            .map_err(|e| tool_error(e.into()))?;

        Ok(ToolOutput::json(json!({
            "status": "queued",
            "message_id": message_id,
            "lead_id": lead_id,
            "channel": channel.as_str(),
        })))
    }
}
