//! Viewing Booking Tool
//!
//! Books a viewing through the Booking Arbiter. The visitor is matched to
//! an existing lead by phone or email, or becomes a new one.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use voice_turn_config::constants::phrases;
use voice_turn_config::BookingConfig;
use voice_turn_core::{InputSchema, PropertySchema, Tool, ToolError, ToolName, ToolOutput, ToolSchema};
use voice_turn_persistence::{Contact, LeadStage, LeadStore, ListingStore, PersistenceError};

use super::super::utils::{parse_instant, str_arg, system_clock, tool_error, Clock};
use crate::arbiter::BookingArbiter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment_id: String,
    pub reservation_id: Uuid,
    pub lead_id: Uuid,
    pub unit_id: String,
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    pub calendar_event_url: Option<String>,
}

pub struct BookViewingTool {
    listings: Arc<dyn ListingStore>,
    leads: Arc<dyn LeadStore>,
    arbiter: Arc<BookingArbiter>,
    booking: BookingConfig,
    clock: Clock,
}

impl BookViewingTool {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        leads: Arc<dyn LeadStore>,
        arbiter: Arc<BookingArbiter>,
        booking: BookingConfig,
    ) -> Self {
        Self {
            listings,
            leads,
            arbiter,
            booking,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn visitor(input: &Value) -> Result<Contact, ToolError> {
        let visitor = input
            .get("visitor")
            .ok_or_else(|| ToolError::invalid_params("visitor is required"))?;
        let optional = |field: &str| {
            visitor
                .get(field)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let contact = Contact {
            name: str_arg(visitor, "name")
                .map_err(|_| ToolError::invalid_params("visitor.name is required"))?
                .to_string(),
            phone: optional("phone"),
            email: optional("email"),
        };
        if contact.phone.is_none() && contact.email.is_none() {
            return Err(ToolError::invalid_params("visitor.phone or visitor.email is required"));
        }
        Ok(contact)
    }
}

#[async_trait]
impl Tool for BookViewingTool {
    fn name(&self) -> ToolName {
        ToolName::BookViewing
    }

    fn description(&self) -> &str {
        "Book a viewing slot for a unit"
    }

    fn schema(&self) -> ToolSchema {
        let visitor = InputSchema::object()
            .property("name", PropertySchema::string("Visitor's name"), true)
            .property("phone", PropertySchema::string("Contact number"), false)
            .property("email", PropertySchema::string("Email address"), false);

        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object()
                .property("unit_id", PropertySchema::string("Unit identifier"), true)
                .property(
                    "slot_start",
                    PropertySchema::date_time("Slot start from list_slots (ISO-8601)"),
                    true,
                )
                .property("visitor", PropertySchema::object("Visitor contact", visitor), true)
                .property(
                    "session_id",
                    PropertySchema::string("Originating call session"),
                    false,
                ),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let unit_id = str_arg(&input, "unit_id")?;
        let slot_start = parse_instant("slot_start", str_arg(&input, "slot_start")?)?;
        let contact = Self::visitor(&input)?;
        let session_id = input.get("session_id").and_then(|v| v.as_str());

        if slot_start <= (self.clock)() {
            return Err(ToolError::invalid_params("slot_start is in the past"));
        }
        if !self.booking.daily_slots().contains(&slot_start.time()) {
            return Err(ToolError::invalid_params(format!(
                "slot_start must be one of the daily slot times {:?} UTC",
                self.booking.slot_times
            )));
        }

        let listing = self
            .listings
            .get(unit_id)
            .await
            .map_err(|e| tool_error(e.into()))?
            .ok_or_else(|| ToolError::missing_record(format!("Unknown unit: {}", unit_id)))?;
        if !listing.is_available_on(slot_start.date_naive()) {
            return Err(ToolError::conflict(phrases::SLOT_TAKEN));
        }

        let lead = self.leads.find_or_create(&contact).await.map_err(|e| match e {
            PersistenceError::InvalidData(message) => ToolError::invalid_params(message),
            other => tool_error(other.into()),
        })?;

        let slot_end = slot_start + Duration::minutes(self.booking.slot_duration_minutes);
        let confirmed = self
            .arbiter
            .book(unit_id, slot_start, slot_end, session_id)
            .await
            .map_err(tool_error)?;

        self.leads
            .advance_stage(lead.lead_id, LeadStage::Booked)
            .await
            .map_err(|e| tool_error(e.into()))?;

        let appointment_id = format!(
            "APT{}",
            confirmed.reservation_id.simple().to_string()[..8].to_uppercase()
        );
        tracing::info!(
            unit_id,
            slot_start = %slot_start,
            lead_id = %lead.lead_id,
            appointment_id = %appointment_id,
            "Viewing booked"
        );

        Ok(ToolOutput::json(BookingConfirmation {
            appointment_id,
            reservation_id: confirmed.reservation_id,
            lead_id: lead.lead_id,
            unit_id: listing.unit_id,
            slot_start: confirmed.slot_start,
            slot_end: confirmed.slot_end,
            calendar_event_url: None,
        }))
    }
}
