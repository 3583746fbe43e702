//! Demo catalog used when no external listing service is configured

use chrono::{Duration, NaiveDate};

use crate::listings::{Address, Fee, Listing};

/// Days the demo units stay open for viewings
pub const DEMO_AVAILABILITY_DAYS: i64 = 60;

/// Two Karachi units; the Gulshan unit has no deposit on record
pub fn demo_listings(today: NaiveDate) -> Vec<Listing> {
    let until = Some(today + Duration::days(DEMO_AVAILABILITY_DAYS));

    vec![
        Listing {
            unit_id: "unit-clifton-2br".to_string(),
            property_id: "prop-clifton-block5".to_string(),
            title: "2BR Clifton".to_string(),
            rent: 120_000,
            deposit: Some(240_000),
            fees: vec![Fee {
                name: "maintenance".to_string(),
                amount: 8_000,
            }],
            utilities_included: vec!["water".to_string()],
            notes: None,
            beds: 2,
            baths: 2,
            sqft: Some(1_350),
            furnished: false,
            amenities: vec![
                "sea view".to_string(),
                "parking".to_string(),
                "generator backup".to_string(),
            ],
            address: Address {
                line: "Block 5".to_string(),
                area: "Clifton".to_string(),
                city: "Karachi".to_string(),
            },
            images: vec!["/images/clifton-2br-1.jpg".to_string()],
            available_from: Some(today),
            available_until: until,
        },
        Listing {
            unit_id: "unit-gulshan-1br".to_string(),
            property_id: "prop-gulshan-block7".to_string(),
            title: "1BR Gulshan".to_string(),
            rent: 65_000,
            deposit: None,
            fees: Vec::new(),
            utilities_included: Vec::new(),
            notes: None,
            beds: 1,
            baths: 1,
            sqft: Some(720),
            furnished: true,
            amenities: vec![
                "near park".to_string(),
                "security".to_string(),
                "high-speed internet".to_string(),
            ],
            address: Address {
                line: "Block 7".to_string(),
                area: "Gulshan-e-Iqbal".to_string(),
                city: "Karachi".to_string(),
            },
            images: vec!["/images/gulshan-1br-1.jpg".to_string()],
            available_from: Some(today),
            available_until: until,
        },
    ]
}
