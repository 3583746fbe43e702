//! Conversation types: turn states, utterances and the rolling context window

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// States of one call's turn state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Waiting for a final caption
    #[default]
    Listening,
    /// Waiting on the planner
    Planning,
    /// Running planned tool calls in order
    ToolDispatch,
    /// Playing the reply; the only interruptible state
    Speaking,
    /// Terminal
    Closed,
}

static TURN_TRANSITIONS: Lazy<HashMap<TurnState, &'static [TurnState]>> = Lazy::new(|| {
    use TurnState::*;
    let mut map = HashMap::new();
    map.insert(Listening, &[Planning, Closed] as &[_]);
    map.insert(Planning, &[ToolDispatch, Speaking, Listening, Closed] as &[_]);
    map.insert(ToolDispatch, &[Speaking, Listening, Closed] as &[_]);
    map.insert(Speaking, &[Listening, Closed] as &[_]);
    map.insert(Closed, &[] as &[_]);
    map
});

impl TurnState {
    pub fn allowed_transitions(&self) -> &'static [TurnState] {
        TURN_TRANSITIONS.get(self).copied().unwrap_or(&[])
    }

    pub fn can_transition_to(&self, target: TurnState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Barge-in may only cancel output while speaking
    pub fn is_interruptible(&self) -> bool {
        matches!(self, TurnState::Speaking)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Listening => "listening",
            TurnState::Planning => "planning",
            TurnState::ToolDispatch => "tool_dispatch",
            TurnState::Speaking => "speaking",
            TurnState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
    Tool,
}

/// Structured result attached to a tool utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPayload {
    pub tool: String,
    pub arguments: Value,
    /// Tool output, or `{"error": kind, "message": ..}` on failure
    pub result: Value,
    pub ok: bool,
}

/// One committed entry of the conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ToolPayload>,
    /// Agent speech cut short by barge-in
    #[serde(default)]
    pub interrupted: bool,
}

impl Utterance {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text)
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Speaker::Agent, text)
    }

    pub fn tool(text: impl Into<String>, payload: ToolPayload) -> Self {
        Self {
            payload: Some(payload),
            ..Self::new(Speaker::Tool, text)
        }
    }

    /// Agent speech that was cut off by the caller
    pub fn interrupted_agent(text: impl Into<String>) -> Self {
        Self {
            interrupted: true,
            ..Self::new(Speaker::Agent, text)
        }
    }

    fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
            payload: None,
            interrupted: false,
        }
    }
}

/// Bounded, index-addressable ring of the most recent utterances
///
/// Index 0 is the oldest retained utterance. Pushing into a full ring drops
/// the oldest entry.
#[derive(Debug, Clone)]
pub struct UtteranceRing {
    items: VecDeque<Utterance>,
    capacity: usize,
    total_appended: u64,
}

impl UtteranceRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
        }
    }

    /// Append, returning the evicted utterance if the ring was full
    pub fn push(&mut self, utterance: Utterance) -> Option<Utterance> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(utterance);
        self.total_appended += 1;
        evicted
    }

    pub fn get(&self, index: usize) -> Option<&Utterance> {
        self.items.get(index)
    }

    pub fn last(&self) -> Option<&Utterance> {
        self.items.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Utterance> {
        self.items.iter()
    }

    /// Owned copy of the window, oldest first
    pub fn snapshot(&self) -> Vec<Utterance> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of utterances ever appended, including evicted ones
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_transitions() {
        assert!(TurnState::Listening.can_transition_to(TurnState::Planning));
        assert!(TurnState::Planning.can_transition_to(TurnState::Listening));
        assert!(TurnState::Speaking.can_transition_to(TurnState::Listening));
        assert!(!TurnState::Listening.can_transition_to(TurnState::Speaking));
        assert!(TurnState::Closed.allowed_transitions().is_empty());
    }

    #[test]
    fn test_only_speaking_is_interruptible() {
        assert!(TurnState::Speaking.is_interruptible());
        assert!(!TurnState::Planning.is_interruptible());
        assert!(!TurnState::ToolDispatch.is_interruptible());
        assert!(!TurnState::Listening.is_interruptible());
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut ring = UtteranceRing::new(3);
        for i in 0..5 {
            ring.push(Utterance::user(format!("u{}", i)));
        }

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.get(0).map(|u| u.text.as_str()), Some("u2"));
        assert_eq!(ring.last().map(|u| u.text.as_str()), Some("u4"));
        assert_eq!(ring.total_appended(), 5);
    }

    #[test]
    fn test_ring_push_returns_evicted() {
        let mut ring = UtteranceRing::new(1);
        assert!(ring.push(Utterance::user("a")).is_none());
        let evicted = ring.push(Utterance::agent("b"));
        assert_eq!(evicted.map(|u| u.text), Some("a".to_string()));
    }

    #[test]
    fn test_interrupted_agent_flag() {
        let u = Utterance::interrupted_agent("I recommend");
        assert_eq!(u.speaker, Speaker::Agent);
        assert!(u.interrupted);
    }
}
