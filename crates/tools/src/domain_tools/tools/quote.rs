//! Quote Tool
//!
//! Reads rent, deposit and fees verbatim from the listing record. A figure
//! missing from the record is returned as `"unknown"`, never estimated.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use voice_turn_config::constants::phrases;
use voice_turn_core::{InputSchema, PropertySchema, Tool, ToolError, ToolName, ToolOutput, ToolSchema};
use voice_turn_persistence::{Fee, ListingStore};

use super::super::utils::{str_arg, tool_error};
use crate::grounding::Figure;

/// Cost breakdown for one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub unit_id: String,
    pub title: String,
    pub rent: Figure,
    pub deposit: Figure,
    pub fees: Vec<Fee>,
    pub utilities_included: Vec<String>,
    pub notes: Option<String>,
    /// Set when a start date was asked about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_on_start_date: Option<bool>,
}

pub struct QuoteTotalTool {
    listings: Arc<dyn ListingStore>,
}

impl QuoteTotalTool {
    pub fn new(listings: Arc<dyn ListingStore>) -> Self {
        Self { listings }
    }
}

#[async_trait]
impl Tool for QuoteTotalTool {
    fn name(&self) -> ToolName {
        ToolName::QuoteTotal
    }

    fn description(&self) -> &str {
        "Get rent, deposit and fees for a unit exactly as recorded"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object()
                .property("unit_id", PropertySchema::string("Unit identifier"), true)
                .property(
                    "start_date",
                    PropertySchema::date("Intended move-in date (YYYY-MM-DD)"),
                    false,
                ),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let unit_id = str_arg(&input, "unit_id")?;
        let start_date = match input.get("start_date").and_then(|v| v.as_str()) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| ToolError::invalid_params("start_date must be YYYY-MM-DD"))?,
            ),
            None => None,
        };

        let listing = self
            .listings
            .get(unit_id)
            .await
            .map_err(|e| tool_error(e.into()))?
            .ok_or_else(|| ToolError::missing_record(format!("Unknown unit: {}", unit_id)))?;

        let deposit = Figure::from_record(listing.deposit);
        let mut notes = listing.notes.clone();
        if !deposit.is_known() {
            tracing::info!(unit_id, field = "deposit", kind = "grounding_miss", "Figure not on record");
            if notes.is_none() {
                notes = Some(phrases::DEPOSIT_UNAVAILABLE_NOTE.to_string());
            }
        }

        Ok(ToolOutput::json(Quote {
            unit_id: listing.unit_id.clone(),
            title: listing.title.clone(),
            rent: Figure::Known(listing.rent),
            deposit,
            fees: listing.fees.clone(),
            utilities_included: listing.utilities_included.clone(),
            notes,
            available_on_start_date: start_date.map(|date| listing.is_available_on(date)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voice_turn_core::ErrorCode;
    use voice_turn_persistence::seed::demo_listings;
    use voice_turn_persistence::InMemoryListingStore;

    fn tool() -> QuoteTotalTool {
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        QuoteTotalTool::new(Arc::new(InMemoryListingStore::with_listings(demo_listings(today))))
    }

    #[tokio::test]
    async fn test_known_deposit() {
        let output = tool().execute(json!({"unit_id": "unit-clifton-2br"})).await.unwrap();
        let data = output.data().unwrap();
        assert_eq!(data["rent"], 120000);
        assert_eq!(data["deposit"], 240000);
        assert_eq!(data["fees"][0]["amount"], 8000);
        assert!(data["notes"].is_null());
    }

    #[tokio::test]
    async fn test_missing_deposit_is_sentinel() {
        let output = tool().execute(json!({"unit_id": "unit-gulshan-1br"})).await.unwrap();
        let data = output.data().unwrap();
        assert_eq!(data["deposit"], "unknown");
        assert_eq!(data["notes"], phrases::DEPOSIT_UNAVAILABLE_NOTE);
    }

    #[tokio::test]
    async fn test_start_date_availability() {
        let output = tool()
            .execute(json!({"unit_id": "unit-clifton-2br", "start_date": "2031-06-01"}))
            .await
            .unwrap();
        assert_eq!(output.data().unwrap()["available_on_start_date"], false);
    }

    #[tokio::test]
    async fn test_unknown_unit() {
        let err = tool().execute(json!({"unit_id": "nope"})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RecordNotFound);
    }
}
