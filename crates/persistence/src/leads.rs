//! Lead records created from booking visitors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::PersistenceError;

/// Funnel stage; stages only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    New,
    Engaged,
    Booked,
}

impl LeadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Engaged => "engaged",
            Self::Booked => "booked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub stage: LeadStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact details supplied by a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Existing lead matching phone or email, else a new lead at `New`
    async fn find_or_create(&self, contact: &Contact) -> Result<Lead, PersistenceError>;

    async fn get(&self, lead_id: Uuid) -> Result<Option<Lead>, PersistenceError>;

    /// Move forward to `stage`; an earlier stage is ignored
    async fn advance_stage(&self, lead_id: Uuid, stage: LeadStage) -> Result<Lead, PersistenceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<HashMap<Uuid, Lead>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn find_or_create(&self, contact: &Contact) -> Result<Lead, PersistenceError> {
        let phone = contact.phone.as_deref().map(normalize_phone).filter(|p| !p.is_empty());
        let email = contact.email.as_deref().map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
        if phone.is_none() && email.is_none() {
            return Err(PersistenceError::InvalidData(
                "lead needs a phone number or email".to_string(),
            ));
        }

        // Single write lock so two callers with the same contact get one lead
        let mut leads = self.leads.write();
        let existing = leads.values().find(|lead| {
            let phone_match = phone.is_some() && lead.phone.as_deref().map(normalize_phone) == phone;
            let email_match = email.is_some() && lead.email.as_deref().map(str::to_lowercase) == email;
            phone_match || email_match
        });
        if let Some(lead) = existing {
            return Ok(lead.clone());
        }

        let now = Utc::now();
        let lead = Lead {
            lead_id: Uuid::new_v4(),
            name: contact.name.trim().to_string(),
            phone,
            email,
            stage: LeadStage::New,
            created_at: now,
            updated_at: now,
        };
        leads.insert(lead.lead_id, lead.clone());
        tracing::debug!(lead_id = %lead.lead_id, "Lead created");
        Ok(lead)
    }

    async fn get(&self, lead_id: Uuid) -> Result<Option<Lead>, PersistenceError> {
        Ok(self.leads.read().get(&lead_id).cloned())
    }

    async fn advance_stage(&self, lead_id: Uuid, stage: LeadStage) -> Result<Lead, PersistenceError> {
        let mut leads = self.leads.write();
        let lead = leads
            .get_mut(&lead_id)
            .ok_or_else(|| PersistenceError::NotFound(format!("lead {}", lead_id)))?;
        if stage > lead.stage {
            lead.stage = stage;
            lead.updated_at = Utc::now();
        }
        Ok(lead.clone())
    }
}
