//! Rule-based planner
//!
//! Proposes a turn from keyword intents and the facts already surfaced by
//! tools in the window. Unit ids, slots and lead ids are only ever read
//! back from tool payloads.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde_json::{json, Value};

use voice_turn_config::constants::phrases;
use voice_turn_core::{Plan, PlannedCall, Planner, Result, Speaker, ToolName, Utterance};
use voice_turn_tools::{find_area, ListingCard, SlotList};

use super::extract::{RequestExtractor, VisitorContact};

const FOLLOWUP_KEYWORDS: &[&str] = &["follow up", "follow-up", "followup", "text me", "email me", "send me"];
const QUOTE_KEYWORDS: &[&str] = &["deposit", "cost", "total", "price of", "how much", "fees"];
const SLOT_KEYWORDS: &[&str] = &["viewing", "visit", "slots", "available", "see it"];
const SEARCH_KEYWORDS: &[&str] = &["apartment", "flat", "listing", "place", "house", "looking for", "rent"];

const ASK_UNIT: &str = "Which listing do you mean? I can search for a few first.";
const ASK_CONTACT: &str = "To book it I need your name and a phone number or email.";
const ASK_BOOKING_FIRST: &str = "I can send the details once a viewing is booked.";
const CHECKING_TIMES: &str = "Let me check the open viewing times.";

/// Rental intents, in matching priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Followup,
    Book,
    Quote,
    Slots,
    Search,
    Unclear,
}

/// What earlier tool results told us
#[derive(Debug, Default)]
struct Recall {
    /// (unit_id, area), most recently surfaced first
    units: Vec<(String, String)>,
    slots: Option<(String, Vec<String>)>,
    lead_id: Option<String>,
    contact: VisitorContact,
    /// Latest time of day the caller asked for
    requested_time: Option<(u32, u32)>,
}

impl Recall {
    fn from_context(context: &[Utterance], extractor: &RequestExtractor) -> Self {
        let mut recall = Recall::default();

        for utterance in context {
            match utterance.speaker {
                Speaker::User => {
                    let mut newer = extractor.extract_contact(&utterance.text);
                    newer.merge(std::mem::take(&mut recall.contact));
                    recall.contact = newer;
                    if let Some(time) = extractor.extract_time(&utterance.text) {
                        recall.requested_time = Some(time);
                    }
                },
                Speaker::Tool => {
                    if let Some(payload) = utterance.payload.as_ref().filter(|p| p.ok) {
                        recall.absorb(&payload.tool, &payload.result);
                    }
                },
                Speaker::Agent => {},
            }
        }
        recall
    }

    fn absorb(&mut self, tool: &str, result: &Value) {
        match tool.parse::<ToolName>() {
            Ok(ToolName::SearchListings) => {
                let cards: Vec<ListingCard> = result
                    .get("results")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                if !cards.is_empty() {
                    self.units = cards
                        .into_iter()
                        .map(|card| (card.unit_id, card.address.area))
                        .collect();
                }
            },
            Ok(ToolName::QuoteTotal) => {
                if let Some(unit_id) = result.get("unit_id").and_then(|v| v.as_str()) {
                    self.focus(unit_id);
                }
            },
            Ok(ToolName::ListSlots) => {
                if let Ok(list) = serde_json::from_value::<SlotList>(result.clone()) {
                    self.focus(&list.unit_id);
                    let starts = list.slots.iter().map(|s| s.start.to_rfc3339()).collect();
                    self.slots = Some((list.unit_id, starts));
                }
            },
            Ok(ToolName::BookViewing) => {
                if let Some(lead_id) = result.get("lead_id").and_then(|v| v.as_str()) {
                    self.lead_id = Some(lead_id.to_string());
                }
            },
            Ok(ToolName::SendFollowup) | Err(_) => {},
        }
    }

    fn focus(&mut self, unit_id: &str) {
        let area = match self.units.iter().position(|(id, _)| id == unit_id) {
            Some(index) => self.units.remove(index).1,
            None => String::new(),
        };
        self.units.insert(0, (unit_id.to_string(), area));
    }

    /// The unit whose area the caller named, else the one in focus
    fn unit_for(&self, text: &str) -> Option<String> {
        if let Some(area) = find_area(text) {
            if let Some((unit_id, _)) = self.units.iter().find(|(_, a)| a.eq_ignore_ascii_case(area)) {
                return Some(unit_id.clone());
            }
        }
        self.units.first().map(|(unit_id, _)| unit_id.clone())
    }
}

/// Keyword planner used when no planner endpoint is configured
pub struct RulePlanner {
    extractor: RequestExtractor,
}

impl RulePlanner {
    pub fn new() -> Self {
        Self {
            extractor: RequestExtractor::new(),
        }
    }

    fn intent(&self, lower: &str, recall: &Recall, has_contact: bool) -> Intent {
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if mentions(FOLLOWUP_KEYWORDS) {
            Intent::Followup
        } else if lower.split(|c: char| !c.is_alphanumeric()).any(|w| w == "book")
            || (has_contact && recall.slots.is_some())
        {
            Intent::Book
        } else if mentions(QUOTE_KEYWORDS) && !recall.units.is_empty() {
            Intent::Quote
        } else if mentions(SLOT_KEYWORDS) && !recall.units.is_empty() {
            Intent::Slots
        } else if !self.extractor.extract_criteria(lower).is_empty() || mentions(SEARCH_KEYWORDS) {
            Intent::Search
        } else {
            Intent::Unclear
        }
    }

    fn book(&self, text: &str, recall: &Recall) -> Plan {
        let Some(unit_id) = recall.unit_for(text).or_else(|| recall.slots.as_ref().map(|(u, _)| u.clone()))
        else {
            return Plan::reply(ASK_UNIT);
        };

        let starts = match &recall.slots {
            Some((slot_unit, starts)) if *slot_unit == unit_id && !starts.is_empty() => starts,
            _ => {
                return Plan::reply(CHECKING_TIMES)
                    .with_call(PlannedCall::new(ToolName::ListSlots.as_str(), json!({"unit_id": unit_id})));
            },
        };

        let slot_start = self
            .extractor
            .extract_time(text)
            .or(recall.requested_time)
            .and_then(|(hour, minute)| {
                starts.iter().find(|s| {
                    DateTime::parse_from_rfc3339(s)
                        .map(|t| {
                            let t = t.with_timezone(&Utc);
                            t.hour() == hour && t.minute() == minute
                        })
                        .unwrap_or(false)
                })
            })
            .unwrap_or(&starts[0]);

        let mut contact = self.extractor.extract_contact(text);
        contact.merge(recall.contact.clone());
        if !contact.is_bookable() {
            return Plan::reply(ASK_CONTACT);
        }

        Plan::default().with_call(PlannedCall::new(
            ToolName::BookViewing.as_str(),
            json!({
                "unit_id": unit_id,
                "slot_start": slot_start,
                "visitor": contact.to_value(),
            }),
        ))
    }
}

impl Default for RulePlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Planner for RulePlanner {
    async fn plan(&self, session_id: &str, context: &[Utterance]) -> Result<Plan> {
        let Some(latest) = context.iter().rev().find(|u| u.speaker == Speaker::User) else {
            return Ok(Plan::reply(phrases::CLARIFY));
        };
        let text = latest.text.as_str();
        let lower = text.to_lowercase();
        let recall = Recall::from_context(context, &self.extractor);
        let current_contact = self.extractor.extract_contact(text);
        let has_contact = current_contact.phone.is_some() || current_contact.email.is_some();

        let intent = self.intent(&lower, &recall, has_contact);
        tracing::debug!(session_id, intent = ?intent, "Rule planner intent");

        let plan = match intent {
            Intent::Followup => match &recall.lead_id {
                Some(lead_id) => {
                    let channel = if lower.contains("email") { "email" } else { "sms" };
                    Plan::default().with_call(PlannedCall::new(
                        ToolName::SendFollowup.as_str(),
                        json!({"lead_id": lead_id, "channel": channel}),
                    ))
                },
                None => Plan::reply(ASK_BOOKING_FIRST),
            },
            Intent::Book => self.book(text, &recall),
            Intent::Quote => match recall.unit_for(&lower) {
                Some(unit_id) => Plan::default().with_call(PlannedCall::new(
                    ToolName::QuoteTotal.as_str(),
                    json!({"unit_id": unit_id}),
                )),
                None => Plan::reply(ASK_UNIT),
            },
            Intent::Slots => match recall.unit_for(&lower) {
                Some(unit_id) => Plan::default().with_call(PlannedCall::new(
                    ToolName::ListSlots.as_str(),
                    json!({"unit_id": unit_id}),
                )),
                None => Plan::reply(ASK_UNIT),
            },
            Intent::Search => {
                let criteria = self.extractor.extract_criteria(text);
                Plan::default().with_call(PlannedCall::new(
                    ToolName::SearchListings.as_str(),
                    json!({"filters": criteria.to_filters()}),
                ))
            },
            Intent::Unclear => Plan::reply(phrases::CLARIFY),
        };

        Ok(plan)
    }

    fn name(&self) -> &str {
        "rules"
    }
}
