//! Reply rendering
//!
//! The spoken reply for a turn is the planner's text, filtered by the
//! grounding guard, followed by one rendering per tool result. Figures in
//! a rendering come straight from the tool payload.

use chrono::{DateTime, Utc};
use serde_json::Value;

use voice_turn_config::constants::{currency, phrases};
use voice_turn_core::{ErrorKind, ToolName, ToolPayload, Utterance};
use voice_turn_tools::{format_amount, BookingConfirmation, GroundingGuard, ListingCard, Quote, SlotList};

/// Cards read aloud per search
const MAX_SPOKEN_LISTINGS: usize = 3;
/// Slots read aloud per listing
const MAX_SPOKEN_SLOTS: usize = 3;

/// Full reply text for a finished tool dispatch
///
/// Figures in the planner's text must come from a tool payload in `context`
/// or in this turn's `results`.
pub fn render_reply(
    session_id: &str,
    planner_reply: &str,
    context: &[Utterance],
    results: &[ToolPayload],
) -> String {
    let mut guard = GroundingGuard::from_context(context);
    for result in results.iter().filter(|r| r.ok) {
        guard.allow_payload(&result.result);
    }
    let mut parts: Vec<String> = Vec::new();

    let grounded = guard.filter(session_id, planner_reply);
    if !grounded.is_empty() {
        parts.push(grounded);
    }
    parts.extend(results.iter().map(render_payload).filter(|s| !s.is_empty()));

    parts.join(" ")
}

/// Speech for one tool result
pub fn render_payload(payload: &ToolPayload) -> String {
    if !payload.ok {
        return render_failure(&payload.result);
    }

    let rendered = match payload.tool.parse::<ToolName>() {
        Ok(ToolName::SearchListings) => render_search(&payload.result),
        Ok(ToolName::QuoteTotal) => serde_json::from_value::<Quote>(payload.result.clone())
            .ok()
            .map(|quote| render_quote(&quote)),
        Ok(ToolName::ListSlots) => serde_json::from_value::<SlotList>(payload.result.clone())
            .ok()
            .map(|list| render_slots(&list)),
        Ok(ToolName::BookViewing) => {
            serde_json::from_value::<BookingConfirmation>(payload.result.clone())
                .ok()
                .map(|booking| render_booking(&booking))
        },
        Ok(ToolName::SendFollowup) => Some(render_followup(&payload.result)),
        Err(_) => None,
    };

    rendered.unwrap_or_else(|| {
        tracing::warn!(tool = %payload.tool, "Tool result could not be rendered");
        phrases::TOOL_APOLOGY.to_string()
    })
}

/// Tool error payload: `{ "error": kind, "message": .. }`
pub fn failure_payload(kind: ErrorKind, message: &str) -> Value {
    serde_json::json!({ "error": kind.as_str(), "message": message })
}

fn render_failure(result: &Value) -> String {
    match result.get("error").and_then(|v| v.as_str()) {
        Some(kind) if kind == ErrorKind::Conflict.as_str() => {
            format!("Sorry, that slot is taken. {}. Would another time work?", phrases::SLOT_TAKEN)
        },
        Some(kind) if kind == ErrorKind::Validation.as_str() => {
            format!("{} Could you check the details for me?", phrases::TOOL_APOLOGY)
        },
        Some(kind) if kind == ErrorKind::NotFound.as_str() => {
            format!("{} I couldn't find that record.", phrases::TOOL_APOLOGY)
        },
        _ => phrases::TOOL_APOLOGY.to_string(),
    }
}

fn money(amount: i64) -> String {
    format!("{} {}", currency::LABEL, format_amount(amount))
}

fn render_search(result: &Value) -> Option<String> {
    let cards: Vec<ListingCard> = serde_json::from_value(result.get("results")?.clone()).ok()?;
    if cards.is_empty() {
        return Some("I couldn't find any listings matching that.".to_string());
    }

    let spoken: Vec<String> = cards
        .iter()
        .take(MAX_SPOKEN_LISTINGS)
        .map(|card| {
            format!(
                "{} in {}, {} bedrooms, {} a month",
                card.title,
                card.address.area,
                card.beds,
                money(card.rent)
            )
        })
        .collect();

    let mut text = format!("Here is what I found: {}.", spoken.join("; "));
    if cards.len() > MAX_SPOKEN_LISTINGS || result.get("next_cursor").is_some() {
        text.push_str(" There are more if you'd like to hear them.");
    }
    Some(text)
}

fn render_quote(quote: &Quote) -> String {
    let mut text = format!("For {}, the rent is {} a month.", quote.title, quote.rent.render());
    if quote.deposit.is_known() {
        text.push_str(&format!(" The deposit is {}.", quote.deposit.render()));
    } else {
        text.push_str(&format!(" On the deposit: {}", quote.deposit.render()));
    }
    if !quote.fees.is_empty() {
        let fees: Vec<String> = quote
            .fees
            .iter()
            .map(|fee| format!("{} {}", fee.name, money(fee.amount)))
            .collect();
        text.push_str(&format!(" Fees: {}.", fees.join(", ")));
    }
    if !quote.utilities_included.is_empty() {
        text.push_str(&format!(" Included: {}.", quote.utilities_included.join(", ")));
    }
    if quote.available_on_start_date == Some(false) {
        text.push_str(" It isn't available from the date you asked for.");
    }
    text
}

fn spoken_time(at: &DateTime<Utc>) -> String {
    at.format("%A %-d %B at %H:%M").to_string()
}

fn render_slots(list: &SlotList) -> String {
    if list.slots.is_empty() {
        return "There are no open viewing slots in that window.".to_string();
    }
    let times: Vec<String> = list
        .slots
        .iter()
        .take(MAX_SPOKEN_SLOTS)
        .map(|slot| spoken_time(&slot.start))
        .collect();
    format!("Open viewing times: {}. Which suits you?", times.join(", "))
}

fn render_booking(booking: &BookingConfirmation) -> String {
    format!(
        "You're booked for {}. Your confirmation code is {}.",
        spoken_time(&booking.slot_start),
        booking.appointment_id
    )
}

fn render_followup(result: &Value) -> String {
    match result.get("channel").and_then(|v| v.as_str()) {
        Some("email") => "I've queued the details to your email.".to_string(),
        _ => "I've queued the details by text message.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voice_turn_tools::numbers_in;

    fn payload(tool: &str, result: Value) -> ToolPayload {
        ToolPayload {
            tool: tool.into(),
            arguments: json!({}),
            result,
            ok: true,
        }
    }

    #[test]
    fn test_unknown_deposit_renders_guard_phrase() {
        let quote = payload(
            "quote_total",
            json!({
                "unit_id": "unit-gulshan-1br", "title": "1BR Gulshan", "rent": 65000,
                "deposit": "unknown", "fees": [], "utilities_included": [],
                "notes": phrases::DEPOSIT_UNAVAILABLE_NOTE
            }),
        );
        let spoken = render_payload(&quote);
        assert!(spoken.contains(phrases::GUARD_PHRASE));
        // the only figures are the title's and the rent
        assert_eq!(numbers_in(&spoken), vec!["1", "65000"]);
    }

    #[test]
    fn test_known_quote() {
        let quote = payload(
            "quote_total",
            json!({
                "unit_id": "unit-clifton-2br", "title": "2BR Clifton", "rent": 120000,
                "deposit": 240000, "fees": [{"name": "maintenance", "amount": 8000}],
                "utilities_included": ["water"]
            }),
        );
        assert_eq!(
            render_payload(&quote),
            "For 2BR Clifton, the rent is PKR 120,000 a month. The deposit is PKR 240,000. \
             Fees: maintenance PKR 8,000. Included: water."
        );
    }

    #[test]
    fn test_search_lists_cards() {
        let search = payload(
            "search_listings",
            json!({"results": [{
                "unit_id": "unit-clifton-2br", "property_id": "p1", "title": "2BR Clifton",
                "rent": 120000, "beds": 2, "baths": 2, "furnished": false, "amenities": [],
                "address": {"line": "Block 5", "area": "Clifton", "city": "Karachi"},
                "images": []
            }]}),
        );
        assert_eq!(
            render_payload(&search),
            "Here is what I found: 2BR Clifton in Clifton, 2 bedrooms, PKR 120,000 a month."
        );

        let empty = payload("search_listings", json!({"results": []}));
        assert_eq!(render_payload(&empty), "I couldn't find any listings matching that.");
    }

    #[test]
    fn test_failures() {
        let conflict = ToolPayload {
            ok: false,
            ..payload("book_viewing", failure_payload(ErrorKind::Conflict, "Slot no longer available"))
        };
        assert!(render_payload(&conflict).contains(phrases::SLOT_TAKEN));

        let timeout = ToolPayload {
            ok: false,
            ..payload("quote_total", failure_payload(ErrorKind::UpstreamTimeout, "late"))
        };
        assert_eq!(render_payload(&timeout), phrases::TOOL_APOLOGY);
    }

    #[test]
    fn test_slots() {
        let slots = payload(
            "list_slots",
            json!({"unit_id": "u1", "slots": [
                {"start": "2030-01-02T10:00:00Z", "end": "2030-01-02T10:30:00Z"}
            ]}),
        );
        assert_eq!(
            render_payload(&slots),
            "Open viewing times: Wednesday 2 January at 10:00. Which suits you?"
        );
    }

    #[test]
    fn test_planner_numbers_are_guarded() {
        let context = vec![Utterance::user("two bedroom under 120000")];
        let reply = render_reply(
            "s1",
            "Rents here start at 90000. Let me check.",
            &context,
            &[],
        );
        assert_eq!(reply, "Let me check.");
    }

    #[test]
    fn test_caller_figures_are_not_echoed() {
        let quote = payload(
            "quote_total",
            json!({
                "unit_id": "unit-gulshan-1br", "title": "1BR Gulshan", "rent": 65000,
                "deposit": "unknown", "fees": [], "utilities_included": []
            }),
        );
        let context = vec![
            Utterance::user("is the deposit 50000 on the gulshan flat"),
            Utterance::tool("quote_total", quote.clone()),
        ];

        let reply = render_reply("s1", "Yes, the deposit is 50000.", &context, &[quote.clone()]);
        assert!(!reply.contains("50000"));
        assert!(reply.contains(phrases::GUARD_PHRASE));

        let reply = render_reply(
            "s1",
            "The deposit is one hundred thirty thousand rupees.",
            &context,
            &[quote],
        );
        assert!(!reply.contains("thousand"));
        assert!(reply.starts_with("For 1BR Gulshan"));
    }

    #[test]
    fn test_results_ground_without_context() {
        // the turn's own results may have scrolled out of a short window
        let search = payload(
            "search_listings",
            json!({"results": [{
                "unit_id": "unit-clifton-2br", "property_id": "p1", "title": "2BR Clifton",
                "rent": 120000, "beds": 2, "baths": 2, "furnished": false, "amenities": [],
                "address": {"line": "Block 5", "area": "Clifton", "city": "Karachi"},
                "images": []
            }]}),
        );
        let reply = render_reply("s1", "Clifton is 120,000 a month.", &[], &[search.clone()]);
        assert!(reply.starts_with("Clifton is 120,000 a month."));

        let failed = ToolPayload {
            ok: false,
            ..search
        };
        let reply = render_reply("s1", "Clifton is 120,000 a month.", &[], &[failed]);
        assert!(!reply.contains("Clifton is"));
    }
}
