//! Missing figures never turn into numbers

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;

use voice_turn_config::constants::phrases;
use voice_turn_config::BookingConfig;
use voice_turn_persistence::in_memory;
use voice_turn_tools::{create_router, numbers_in, system_clock, BookingArbiter, Figure, Quote, ToolRouter};

fn router() -> ToolRouter {
    let persistence = in_memory(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
    let arbiter = Arc::new(BookingArbiter::new(persistence.bookings.clone()));
    create_router(
        &persistence,
        arbiter,
        &BookingConfig::default(),
        system_clock(),
    )
}

#[tokio::test]
async fn test_missing_deposit_speaks_guard_phrase() {
    let output = router()
        .dispatch("quote_total", json!({"unit_id": "unit-gulshan-1br"}), Some("s1"))
        .await
        .unwrap();

    let quote: Quote = serde_json::from_value(output.data().unwrap().clone()).unwrap();
    assert_eq!(quote.deposit, Figure::Unknown);
    assert_eq!(quote.rent, Figure::Known(65_000));

    let spoken = quote.deposit.render();
    assert_eq!(spoken, phrases::GUARD_PHRASE);
    assert!(numbers_in(&spoken).is_empty());
}

#[tokio::test]
async fn test_recorded_deposit_is_verbatim() {
    let output = router()
        .dispatch("quote_total", json!({"unit_id": "unit-clifton-2br"}), None)
        .await
        .unwrap();
    let quote: Quote = serde_json::from_value(output.data().unwrap().clone()).unwrap();
    assert_eq!(quote.deposit, Figure::Known(240_000));
    assert_eq!(quote.deposit.render(), "PKR 240,000");
}
