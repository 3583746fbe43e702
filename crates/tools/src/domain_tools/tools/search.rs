//! Listing Search Tool
//!
//! Filtered catalog search with keyset pagination on `(rent, unit_id)`.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use voice_turn_core::{InputSchema, PropertySchema, Tool, ToolError, ToolName, ToolOutput, ToolSchema};
use voice_turn_persistence::{Address, Listing, ListingQuery, ListingStore};

use super::super::areas::resolve_area;
use super::super::utils::{decode_cursor, encode_cursor, tool_error};

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
struct SearchFilters {
    location: Option<String>,
    rent_min: Option<i64>,
    rent_max: Option<i64>,
    beds: Option<u32>,
    baths: Option<u32>,
    furnished: Option<bool>,
    #[serde(default)]
    amenities: Vec<String>,
    available_from: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    filters: SearchFilters,
    limit: Option<usize>,
    cursor: Option<String>,
}

/// Listing as returned to callers and the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingCard {
    pub unit_id: String,
    pub property_id: String,
    pub title: String,
    pub rent: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit: Option<i64>,
    pub beds: u32,
    pub baths: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqft: Option<u32>,
    pub furnished: bool,
    pub amenities: Vec<String>,
    pub address: Address,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_from: Option<NaiveDate>,
}

impl From<Listing> for ListingCard {
    fn from(listing: Listing) -> Self {
        Self {
            unit_id: listing.unit_id,
            property_id: listing.property_id,
            title: listing.title,
            rent: listing.rent,
            deposit: listing.deposit,
            beds: listing.beds,
            baths: listing.baths,
            sqft: listing.sqft,
            furnished: listing.furnished,
            amenities: listing.amenities,
            address: listing.address,
            images: listing.images,
            available_from: listing.available_from,
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchResult {
    results: Vec<ListingCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

pub struct SearchListingsTool {
    listings: Arc<dyn ListingStore>,
}

impl SearchListingsTool {
    pub fn new(listings: Arc<dyn ListingStore>) -> Self {
        Self { listings }
    }
}

#[async_trait]
impl Tool for SearchListingsTool {
    fn name(&self) -> ToolName {
        ToolName::SearchListings
    }

    fn description(&self) -> &str {
        "Search rental listings by location, rent range, bedrooms, bathrooms, furnishing and amenities"
    }

    fn schema(&self) -> ToolSchema {
        let filters = InputSchema::object()
            .property(
                "location",
                PropertySchema::string("City, area or landmark (e.g. 'sea view')"),
                false,
            )
            .property(
                "rent_min",
                PropertySchema::integer("Minimum monthly rent").with_minimum(0.0),
                false,
            )
            .property(
                "rent_max",
                PropertySchema::integer("Maximum monthly rent").with_minimum(0.0),
                false,
            )
            .property(
                "beds",
                PropertySchema::integer("Minimum bedrooms").with_minimum(0.0),
                false,
            )
            .property(
                "baths",
                PropertySchema::integer("Minimum bathrooms").with_minimum(0.0),
                false,
            )
            .property("furnished", PropertySchema::boolean("Furnished units only"), false)
            .property(
                "amenities",
                PropertySchema::array("Amenities that must all be present", PropertySchema::string("Amenity")),
                false,
            )
            .property(
                "available_from",
                PropertySchema::date("Move-in date (YYYY-MM-DD)"),
                false,
            );

        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: InputSchema::object()
                .property("filters", PropertySchema::object("Search filters", filters), false)
                .property(
                    "limit",
                    PropertySchema::integer("Maximum results")
                        .with_range(1.0, MAX_LIMIT as f64)
                        .with_default(Value::from(DEFAULT_LIMIT)),
                    false,
                )
                .property(
                    "cursor",
                    PropertySchema::string("next_cursor from a previous page"),
                    false,
                ),
        }
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let args: SearchArgs = serde_json::from_value(input)
            .map_err(|e| ToolError::invalid_params(format!("Invalid search arguments: {}", e)))?;

        let limit = args.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ToolError::invalid_params(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        let after = args.cursor.as_deref().map(decode_cursor).transpose()?;

        let filters = args.filters;
        let query = ListingQuery {
            location: filters.location.as_deref().map(resolve_area),
            rent_min: filters.rent_min,
            rent_max: filters.rent_max,
            beds: filters.beds,
            baths: filters.baths,
            furnished: filters.furnished,
            amenities: filters.amenities,
            available_from: filters.available_from,
            after,
            // one extra row tells us whether another page exists
            limit: limit + 1,
        };

        let mut rows = self
            .listings
            .search(&query)
            .await
            .map_err(|e| tool_error(e.into()))?;

        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(|l| encode_cursor(l.rent, &l.unit_id))
        } else {
            None
        };

        tracing::debug!(
            location = ?query.location,
            results = rows.len(),
            has_more,
            "Listing search"
        );

        Ok(ToolOutput::json(SearchResult {
            results: rows.into_iter().map(ListingCard::from).collect(),
            next_cursor,
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

    fn tool() -> SearchListingsTool {
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        SearchListingsTool::new(Arc::new(InMemoryListingStore::with_listings(demo_listings(today))))
    }

    #[tokio::test]
    async fn test_two_bedroom_under_budget() {
        let output = tool()
            .execute(json!({"filters": {"beds": 2, "rent_max": 120000}}))
            .await
            .unwrap();
        let data = output.data().unwrap();
        assert_eq!(data["results"].as_array().unwrap().len(), 1);
        assert_eq!(data["results"][0]["rent"], 120000);
        assert!(data.get("next_cursor").is_none());
    }

    #[tokio::test]
    async fn test_alias_location() {
        let output = tool()
            .execute(json!({"filters": {"location": "sea view"}}))
            .await
            .unwrap();
        assert_eq!(output.data().unwrap()["results"][0]["unit_id"], "unit-clifton-2br");
    }

    #[tokio::test]
    async fn test_pagination() {
        let tool = tool();
        let first = tool.execute(json!({"limit": 1})).await.unwrap();
        let first = first.data().unwrap();
        assert_eq!(first["results"][0]["rent"], 65000);
        let cursor = first["next_cursor"].as_str().unwrap().to_string();

        let second = tool.execute(json!({"limit": 1, "cursor": cursor})).await.unwrap();
        let second = second.data().unwrap();
        assert_eq!(second["results"][0]["rent"], 120000);
        assert!(second.get("next_cursor").is_none());
    }

    #[tokio::test]
    async fn test_bad_cursor_and_limit() {
        let tool = tool();
        let err = tool.execute(json!({"cursor": "???"})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        let err = tool.execute(json!({"limit": 51})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[test]
    fn test_schema_rejects_string_beds() {
        let err = tool()
            .validate(&json!({"filters": {"beds": "two"}}))
            .unwrap_err();
        assert!(err.message.contains("filters.beds"));
    }
}
