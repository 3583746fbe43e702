//! Request extraction for rental conversations
//!
//! Pattern-based extraction of search criteria and visitor contact from a
//! single caller utterance.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use voice_turn_tools::find_area;

/// Budget bound direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Max,
    Min,
}

/// Search criteria read from one utterance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub beds: Option<u32>,
    pub baths: Option<u32>,
    pub area: Option<&'static str>,
    pub rent_min: Option<i64>,
    pub rent_max: Option<i64>,
    pub furnished: Option<bool>,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `filters` object for `search_listings`
    pub fn to_filters(&self) -> Value {
        let mut filters = Map::new();
        if let Some(area) = self.area {
            filters.insert("location".into(), Value::from(area));
        }
        if let Some(beds) = self.beds {
            filters.insert("beds".into(), Value::from(beds));
        }
        if let Some(baths) = self.baths {
            filters.insert("baths".into(), Value::from(baths));
        }
        if let Some(min) = self.rent_min {
            filters.insert("rent_min".into(), Value::from(min));
        }
        if let Some(max) = self.rent_max {
            filters.insert("rent_max".into(), Value::from(max));
        }
        if let Some(furnished) = self.furnished {
            filters.insert("furnished".into(), Value::from(furnished));
        }
        Value::Object(filters)
    }
}

/// Visitor contact read from one utterance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitorContact {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl VisitorContact {
    /// A name plus one way to reach them
    pub fn is_bookable(&self) -> bool {
        self.name.is_some() && (self.phone.is_some() || self.email.is_some())
    }

    /// Fill gaps from an earlier utterance
    pub fn merge(&mut self, other: VisitorContact) {
        if self.name.is_none() {
            self.name = other.name;
        }
        if self.phone.is_none() {
            self.phone = other.phone;
        }
        if self.email.is_none() {
            self.email = other.email;
        }
    }

    pub fn to_value(&self) -> Value {
        let mut visitor = Map::new();
        if let Some(name) = &self.name {
            visitor.insert("name".into(), Value::from(name.as_str()));
        }
        if let Some(phone) = &self.phone {
            visitor.insert("phone".into(), Value::from(phone.as_str()));
        }
        if let Some(email) = &self.email {
            visitor.insert("email".into(), Value::from(email.as_str()));
        }
        Value::Object(visitor)
    }
}

const COUNT: &str = r"(\d+|one|two|three|four|five|six)";

const AMOUNT: &str = r"(?:pkr|rs\.?|rupees)?\s*(\d[\d,]*(?:\.\d+)?)\s*(k|thousand)?\b";

static BEDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b{}\s*-?\s*(?:bedrooms?|beds?|br|bhk|rooms?)\b", COUNT)).unwrap()
});

static BATHS: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{}\s*-?\s*(?:bathrooms?|baths?)\b", COUNT)).unwrap());

static BUDGETS: Lazy<Vec<(Regex, Bound)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(&format!(
                r"(?i)\b(?:under|below|less than|upto|up to|max(?:imum)?|budget(?: is| of)?|rent(?: of)?|within)\s*(?:around|about)?\s*{}",
                AMOUNT
            ))
            .unwrap(),
            Bound::Max,
        ),
        (
            Regex::new(&format!(r"(?i)\b(?:over|above|more than|at least|min(?:imum)?)\s*{}", AMOUNT))
                .unwrap(),
            Bound::Min,
        ),
    ]
});

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?i:my name is|name's|call me)\s+([A-Za-z][A-Za-z'-]*(?:\s+[A-Z][A-Za-z'-]*)?)")
        .unwrap()
});

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+?\d[\d\s-]{7,}\d").unwrap());

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").unwrap());

static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").unwrap());

/// Rule-based extractor for listing requests
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestExtractor;

impl RequestExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_criteria(&self, utterance: &str) -> SearchCriteria {
        let lower = utterance.to_lowercase();
        let mut criteria = SearchCriteria {
            beds: extract_count(&BEDS, &lower),
            baths: extract_count(&BATHS, &lower),
            area: find_area(&lower),
            ..Default::default()
        };

        for (pattern, bound) in BUDGETS.iter() {
            if let Some(amount) = pattern.captures(&lower).and_then(|caps| parse_amount(&caps)) {
                match bound {
                    Bound::Max => criteria.rent_max = Some(amount),
                    Bound::Min => criteria.rent_min = Some(amount),
                }
            }
        }

        if lower.contains("unfurnished") {
            criteria.furnished = Some(false);
        } else if lower.contains("furnished") {
            criteria.furnished = Some(true);
        }

        criteria
    }

    pub fn extract_contact(&self, utterance: &str) -> VisitorContact {
        let email = EMAIL.find(utterance).map(|m| m.as_str().to_lowercase());
        // digits inside an email address are not a phone number
        let without_email = EMAIL.replace_all(utterance, " ");
        let phone = PHONE
            .find(&without_email)
            .map(|m| m.as_str().chars().filter(|c| c.is_ascii_digit() || *c == '+').collect());
        let name = NAME
            .captures(utterance)
            .and_then(|caps| caps.get(1))
            .map(|m| capitalize(m.as_str()));

        VisitorContact { name, phone, email }
    }

    /// Hour and minute the caller asked for, 24h clock
    pub fn extract_time(&self, utterance: &str) -> Option<(u32, u32)> {
        let lower = utterance.to_lowercase();
        for caps in TIME.captures_iter(&lower) {
            let minute = caps.get(2).map(|m| m.as_str().parse().unwrap_or(0));
            let meridiem = caps.get(3).map(|m| m.as_str());
            // a bare number is a count, not a time
            if minute.is_none() && meridiem.is_none() {
                continue;
            }
            let mut hour: u32 = match caps[1].parse() {
                Ok(hour) => hour,
                Err(_) => continue,
            };
            match meridiem {
                Some("pm") if hour < 12 => hour += 12,
                Some("am") if hour == 12 => hour = 0,
                _ => {},
            }
            let minute = minute.unwrap_or(0);
            if hour < 24 && minute < 60 {
                return Some((hour, minute));
            }
        }
        None
    }
}

fn extract_count(pattern: &Regex, lower: &str) -> Option<u32> {
    let word = pattern.captures(lower)?.get(1)?.as_str();
    match word {
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        digits => digits.parse().ok(),
    }
}

fn parse_amount(caps: &regex::Captures<'_>) -> Option<i64> {
    let raw = caps.get(1)?.as_str().replace(',', "");
    let value: f64 = raw.parse().ok()?;
    let value = match caps.get(2) {
        Some(_) => value * 1_000.0,
        // "under 120" means 120 thousand
        None if value < 500.0 => value * 1_000.0,
        None => value,
    };
    Some(value.round() as i64)
}

fn capitalize(name: &str) -> String {
    name.split_whitespace()
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_two_bedroom_under_budget() {
        let criteria = RequestExtractor::new().extract_criteria("two bedroom under 120000");
        assert_eq!(criteria.beds, Some(2));
        assert_eq!(criteria.rent_max, Some(120_000));
        assert_eq!(criteria.to_filters(), json!({"beds": 2, "rent_max": 120000}));
    }

    #[test]
    fn test_budget_shorthand() {
        let extractor = RequestExtractor::new();
        assert_eq!(extractor.extract_criteria("budget 80k").rent_max, Some(80_000));
        assert_eq!(extractor.extract_criteria("under 120").rent_max, Some(120_000));
        assert_eq!(extractor.extract_criteria("rent of 90 thousand").rent_max, Some(90_000));
        assert_eq!(extractor.extract_criteria("above 50,000").rent_min, Some(50_000));
    }

    #[test]
    fn test_area_and_rooms() {
        let criteria = RequestExtractor::new()
            .extract_criteria("a furnished 3br with 2 baths near sea view");
        assert_eq!(criteria.beds, Some(3));
        assert_eq!(criteria.baths, Some(2));
        assert_eq!(criteria.area, Some("Clifton"));
        assert_eq!(criteria.furnished, Some(true));
    }

    #[test]
    fn test_nothing_to_search() {
        assert!(RequestExtractor::new().extract_criteria("hello there").is_empty());
    }

    #[test]
    fn test_contact() {
        let contact = RequestExtractor::new()
            .extract_contact("My name is sara Khan, reach me at 0300-1234567 or Sara.K@Example.com");
        assert_eq!(contact.name.as_deref(), Some("Sara Khan"));
        assert_eq!(contact.phone.as_deref(), Some("03001234567"));
        assert_eq!(contact.email.as_deref(), Some("sara.k@example.com"));
        assert!(contact.is_bookable());
    }

    #[test]
    fn test_time() {
        let extractor = RequestExtractor::new();
        assert_eq!(extractor.extract_time("book the 12:30 one"), Some((12, 30)));
        assert_eq!(extractor.extract_time("3 pm please"), Some((15, 0)));
        assert_eq!(extractor.extract_time("book 2 of them"), None);
    }
}
