//! Viewing Slot Tool
//!
//! Lists open viewing slots: fixed daily times on days the unit is
//! available, minus past slots and slots already held or confirmed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use voice_turn_config::BookingConfig;
use voice_turn_core::{InputSchema, PropertySchema, Tool, ToolError, ToolName, ToolOutput, ToolSchema};
use voice_turn_persistence::ListingStore;

use super::super::utils::{str_arg, system_clock, tool_error, Clock};
use crate::arbiter::BookingArbiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlotList {
    pub unit_id: String,
    pub slots: Vec<Slot>,
}

pub struct ListSlotsTool {
    listings: Arc<dyn ListingStore>,
    arbiter: Arc<BookingArbiter>,
    booking: BookingConfig,
    clock: Clock,
}

impl ListSlotsTool {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        arbiter: Arc<BookingArbiter>,
        booking: BookingConfig,
    ) -> Self {
        Self {
            listings,
            arbiter,
            booking,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl Tool for ListSlotsTool {
    fn name(&self) -> ToolName {
        ToolName::ListSlots
    }

    fn description(&self) -> &str {
        "List open viewing slots for a unit"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object()
                .property("unit_id", PropertySchema::string("Unit identifier"), true)
                .property(
                    "days_ahead",
                    PropertySchema::integer("How many days ahead to look")
                        .with_range(1.0, self.booking.max_days_ahead as f64)
                        .with_default(Value::from(self.booking.default_days_ahead)),
                    false,
                ),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let unit_id = str_arg(&input, "unit_id")?;
        let days_ahead = input
            .get("days_ahead")
            .and_then(|v| v.as_i64())
            .unwrap_or(self.booking.default_days_ahead as i64);
        if days_ahead < 1 || days_ahead > self.booking.max_days_ahead as i64 {
            return Err(ToolError::invalid_params(format!(
                "days_ahead must be between 1 and {}",
                self.booking.max_days_ahead
            )));
        }

        let listing = self
            .listings
            .get(unit_id)
            .await
            .map_err(|e| tool_error(e.into()))?
            .ok_or_else(|| ToolError::missing_record(format!("Unknown unit: {}", unit_id)))?;

        let now = (self.clock)();
        let today = now.date_naive();
        let window_start = Utc.from_utc_datetime(&today.and_time(chrono::NaiveTime::MIN));
        let window_end = window_start + Duration::days(days_ahead + 1);

        let taken: HashSet<DateTime<Utc>> = self
            .arbiter
            .active_for_unit(unit_id, window_start, window_end)
            .await
            .map_err(tool_error)?
            .into_iter()
            .map(|r| r.slot_start)
            .collect();

        let duration = Duration::minutes(self.booking.slot_duration_minutes);
        let times = self.booking.daily_slots();
        let mut slots = Vec::new();
        for offset in 0..=days_ahead {
            let date = today + Duration::days(offset);
            if !listing.is_available_on(date) {
                continue;
            }
            for time in &times {
                let start = Utc.from_utc_datetime(&date.and_time(*time));
                if start <= now || taken.contains(&start) {
                    continue;
                }
                slots.push(Slot {
                    start,
                    end: start + duration,
                });
            }
        }
        slots.sort_by_key(|s| s.start);

        tracing::debug!(unit_id, days_ahead, open = slots.len(), "Listed viewing slots");

        Ok(ToolOutput::json(SlotList {
            unit_id: listing.unit_id,
            slots,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use voice_turn_persistence::seed::demo_listings;
    use voice_turn_persistence::{InMemoryBookingStore, InMemoryListingStore};

    fn fixed_clock() -> Clock {
        Arc::new(|| Utc.with_ymd_and_hms(2030, 1, 1, 11, 0, 0).unwrap())
    }

    fn setup() -> (ListSlotsTool, Arc<BookingArbiter>) {
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let listings = Arc::new(InMemoryListingStore::with_listings(demo_listings(today)));
        let arbiter = Arc::new(BookingArbiter::new(Arc::new(InMemoryBookingStore::new())));
        let tool = ListSlotsTool::new(listings, arbiter.clone(), BookingConfig::default())
            .with_clock(fixed_clock());
        (tool, arbiter)
    }

    fn starts(output: &ToolOutput) -> Vec<String> {
        output.data().unwrap()["slots"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["start"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_skips_past_slots_today() {
        let (tool, _) = setup();
        let output = tool
            .execute(json!({"unit_id": "unit-clifton-2br", "days_ahead": 1}))
            .await
            .unwrap();
        let starts = starts(&output);
        // 10:00 today is gone at 11:00
        assert_eq!(starts.len(), 5);
        assert_eq!(starts[0], "2030-01-01T12:30:00Z");
        assert_eq!(starts[2], "2030-01-02T10:00:00Z");
    }

    #[tokio::test]
    async fn test_held_slot_is_hidden() {
        let (tool, arbiter) = setup();
        let start = Utc.with_ymd_and_hms(2030, 1, 2, 10, 0, 0).unwrap();
        arbiter
            .reserve("unit-clifton-2br", start, start + Duration::minutes(30), None)
            .await
            .unwrap();

        let output = tool
            .execute(json!({"unit_id": "unit-clifton-2br", "days_ahead": 1}))
            .await
            .unwrap();
        assert!(!starts(&output).contains(&"2030-01-02T10:00:00Z".to_string()));
        assert_eq!(starts(&output).len(), 4);
    }

    #[tokio::test]
    async fn test_days_ahead_bounds() {
        let (tool, _) = setup();
        assert!(tool
            .execute(json!({"unit_id": "unit-clifton-2br", "days_ahead": 61}))
            .await
            .is_err());
        let output = tool.execute(json!({"unit_id": "unit-clifton-2br"})).await.unwrap();
        // default 14 days: 2 today plus 3 for each of the next 14 days
        assert_eq!(starts(&output).len(), 2 + 14 * 3);
    }
}
