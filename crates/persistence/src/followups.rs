//! Follow-up outbox
//!
//! Messages are queued, not delivered. Delivery belongs to an external
//! sender that drains the outbox.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupChannel {
    Sms,
    Email,
}

impl FollowupChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupStatus {
    Queued,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupMessage {
    pub message_id: Uuid,
    pub lead_id: Uuid,
    pub channel: FollowupChannel,
    pub recipient: String,
    pub body: String,
    pub status: FollowupStatus,
    pub created_at: DateTime<Utc>,
}

impl FollowupMessage {
    pub fn new(lead_id: Uuid, channel: FollowupChannel, recipient: &str, body: &str) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            lead_id,
            channel,
            recipient: recipient.to_string(),
            body: body.to_string(),
            status: FollowupStatus::Queued,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait FollowupSender: Send + Sync {
    async fn send(&self, message: FollowupMessage) -> Result<FollowupStatus, PersistenceError>;
}

/// Sender that only records messages
#[derive(Debug, Default)]
pub struct OutboxFollowupSender {
    outbox: Mutex<Vec<FollowupMessage>>,
}

impl OutboxFollowupSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<FollowupMessage> {
        self.outbox.lock().clone()
    }
}

#[async_trait]
impl FollowupSender for OutboxFollowupSender {
    async fn send(&self, message: FollowupMessage) -> Result<FollowupStatus, PersistenceError> {
        if message.recipient.trim().is_empty() {
            return Err(PersistenceError::InvalidData(format!(
                "no {} recipient for lead {}",
                message.channel.as_str(),
                message.lead_id
            )));
        }
        tracing::info!(
            lead_id = %message.lead_id,
            channel = message.channel.as_str(),
            "Follow-up queued"
        );
        let status = message.status;
        self.outbox.lock().push(message);
        Ok(status)
    }
}
