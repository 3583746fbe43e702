//! Grounding guard
//!
//! No figure reaches speech unless it was read from a tool payload. The
//! caller's own words never ground a number. Figures absent from the backing
//! record travel as `Figure::Unknown` and are spoken as the fixed guard phrase.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use voice_turn_config::constants::{currency, phrases};
use voice_turn_core::{Speaker, Utterance};

const UNKNOWN: &str = "unknown";

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").unwrap());

/// A monetary amount in minor units, or the sentinel for "not on record"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Figure {
    Known(i64),
    Unknown,
}

impl Figure {
    pub fn from_record(amount: Option<i64>) -> Self {
        amount.map_or(Figure::Unknown, Figure::Known)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Figure::Known(_))
    }

    /// Spoken form: "PKR 240,000" or the guard phrase
    pub fn render(&self) -> String {
        match self {
            Figure::Known(amount) => format!("{} {}", currency::LABEL, format_amount(*amount)),
            Figure::Unknown => phrases::GUARD_PHRASE.to_string(),
        }
    }
}

impl Serialize for Figure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Figure::Known(amount) => serializer.serialize_i64(*amount),
            Figure::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

impl<'de> Deserialize<'de> for Figure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Amount(i64),
            Sentinel(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Amount(amount) => Ok(Figure::Known(amount)),
            Repr::Sentinel(s) if s == UNKNOWN => Ok(Figure::Unknown),
            Repr::Sentinel(s) => Err(serde::de::Error::custom(format!(
                "expected an integer amount or \"{}\", got \"{}\"",
                UNKNOWN, s
            ))),
        }
    }
}

/// Group digits in threes: 120000 -> "120,000"
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Numbers appearing in `text`, with grouping commas removed
pub fn numbers_in(text: &str) -> Vec<String> {
    NUMBER
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(',').replace(',', ""))
        .filter(|n| !n.is_empty())
        .collect()
}

/// Spoken scale words; a sentence carrying one states a figure without digits
static SCALE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:hundred|thousand|lakhs?|lacs?|crores?|million)\b").unwrap());

static NUMBER_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:zero|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety)\b",
    )
    .unwrap()
});

/// "two bedrooms", "three-bath": counts, not amounts
static ROOM_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:one|two|three|four|five|six|seven|eight|nine|ten)[\s-]+(?:bed|bath)").unwrap()
});

static MONEY_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:rupees?|rs|pkr|deposits?|rents?|fees?|costs?|price|total|amount)\b").unwrap()
});

/// True when `sentence` states a quantity in words
fn spells_quantity(sentence: &str) -> bool {
    if SCALE_WORD.is_match(sentence) {
        return true;
    }
    let without_rooms = ROOM_COUNT.replace_all(sentence, "");
    NUMBER_WORD.is_match(&without_rooms) && MONEY_WORD.is_match(&without_rooms)
}

/// Payload field a figure was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Rent,
    Deposit,
    Fee,
}

impl Field {
    const ALL: [Field; 3] = [Field::Rent, Field::Deposit, Field::Fee];

    fn of_key(key: &str) -> Option<Self> {
        match key {
            "rent" | "rent_min" | "rent_max" => Some(Field::Rent),
            "deposit" => Some(Field::Deposit),
            "fees" | "fee" => Some(Field::Fee),
            _ => None,
        }
    }

    fn words(&self) -> &'static [&'static str] {
        match self {
            Field::Rent => &["rent", "rents"],
            Field::Deposit => &["deposit", "deposits"],
            Field::Fee => &["fee", "fees"],
        }
    }
}

/// Figures read from one unit's record
#[derive(Debug, Clone)]
struct UnitFigures {
    unit_id: String,
    /// Lowercased title, if the payload carried one
    title: Option<String>,
    /// Distinctive title words ("clifton", "gulshan")
    tokens: Vec<String>,
    figures: HashSet<String>,
}

impl UnitFigures {
    fn is_named_in(&self, lower: &str, words: &[&str]) -> bool {
        lower.contains(&self.unit_id)
            || self.title.as_deref().is_some_and(|t| lower.contains(t))
            || self.tokens.iter().any(|t| words.contains(&t.as_str()))
    }
}

fn words_of(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Numbers a reply may contain, with the record and field each came from
///
/// Only tool payloads seed the guard. A sentence naming a unit may only carry
/// that unit's figures, and a sentence naming rent, deposit or fees may only
/// carry figures read from those fields.
#[derive(Debug, Clone, Default)]
pub struct GroundingGuard {
    known: HashSet<String>,
    by_field: HashMap<Field, HashSet<String>>,
    units: Vec<UnitFigures>,
}

impl GroundingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from every tool payload in the window
    pub fn from_context(context: &[Utterance]) -> Self {
        let mut guard = Self::new();
        for utterance in context.iter().filter(|u| u.speaker == Speaker::Tool) {
            if let Some(payload) = &utterance.payload {
                guard.allow_payload(&payload.result);
            }
        }
        guard
    }

    /// Every number and numeric substring found anywhere in `value`
    pub fn allow_payload(&mut self, value: &Value) {
        self.walk(value, None);
    }

    fn walk(&mut self, value: &Value, field: Option<Field>) -> Vec<String> {
        match value {
            Value::Number(n) => {
                let n = n.to_string();
                self.record(&n, field);
                vec![n]
            },
            Value::String(s) => {
                let found = numbers_in(s);
                for n in &found {
                    self.record(n, field);
                }
                found
            },
            Value::Array(items) => {
                let mut found = Vec::new();
                for item in items {
                    found.extend(self.walk(item, field));
                }
                found
            },
            Value::Object(map) => {
                let mut found = Vec::new();
                for (key, item) in map {
                    found.extend(self.walk(item, Field::of_key(key).or(field)));
                }
                if let Some(unit_id) = map.get("unit_id").and_then(Value::as_str) {
                    let title = map.get("title").and_then(Value::as_str);
                    self.add_unit(unit_id, title, &found);
                }
                found
            },
            Value::Bool(_) | Value::Null => Vec::new(),
        }
    }

    fn record(&mut self, number: &str, field: Option<Field>) {
        self.known.insert(number.to_string());
        if let Some(field) = field {
            self.by_field.entry(field).or_default().insert(number.to_string());
        }
    }

    fn add_unit(&mut self, unit_id: &str, title: Option<&str>, found: &[String]) {
        let unit_id = unit_id.to_lowercase();
        let index = match self.units.iter().position(|u| u.unit_id == unit_id) {
            Some(index) => index,
            None => {
                self.units.push(UnitFigures {
                    unit_id,
                    title: None,
                    tokens: Vec::new(),
                    figures: HashSet::new(),
                });
                self.units.len() - 1
            },
        };

        let unit = &mut self.units[index];
        if let Some(title) = title {
            let title = title.to_lowercase();
            for word in words_of(&title) {
                if word.len() >= 4
                    && word.chars().all(|c| c.is_alphabetic())
                    && !unit.tokens.iter().any(|t| t == word)
                {
                    unit.tokens.push(word.to_string());
                }
            }
            unit.title.get_or_insert(title);
        }
        unit.figures.extend(found.iter().cloned());
    }

    pub fn is_grounded(&self, sentence: &str) -> bool {
        if spells_quantity(sentence) {
            return false;
        }

        let mut lower = sentence.to_lowercase();
        let named: Vec<&UnitFigures> = {
            let words = words_of(&lower);
            self.units.iter().filter(|u| u.is_named_in(&lower, &words)).collect()
        };
        // digits inside a unit's own title ("2BR") are not figures
        for unit in &named {
            if let Some(title) = &unit.title {
                lower = lower.replace(title.as_str(), " ");
            }
        }
        let fields: Vec<Field> = {
            let words = words_of(&lower);
            Field::ALL
                .into_iter()
                .filter(|f| f.words().iter().any(|w| words.contains(w)))
                .collect()
        };

        numbers_in(&lower).iter().all(|n| {
            self.known.contains(n)
                && (named.is_empty() || named.iter().any(|u| u.figures.contains(n)))
                && (fields.is_empty()
                    || fields
                        .iter()
                        .any(|f| self.by_field.get(f).is_some_and(|set| set.contains(n))))
        })
    }

    /// Drop every sentence that carries an unsourced figure
    pub fn filter(&self, session_id: &str, text: &str) -> String {
        let mut kept: Vec<&str> = Vec::new();
        for sentence in sentences(text) {
            if self.is_grounded(sentence) {
                kept.push(sentence);
            } else {
                tracing::warn!(
                    session_id,
                    sentence,
                    kind = "grounding_miss",
                    "Dropped reply sentence with unsourced figure"
                );
            }
        }
        kept.join(" ")
    }
}

/// Split on terminal punctuation followed by whitespace or end of text.
/// A dot between digits ("1.5") does not end a sentence.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
