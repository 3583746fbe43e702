//! Centralized constants for the voice-turn orchestrator
//!
//! Fixed phrases spoken by the agent live here so the grounding guard and
//! the reply renderer agree on them byte for byte.

/// Phrases the agent speaks verbatim
pub mod phrases {
    /// Spoken in place of any figure missing from the backing record
    pub const GUARD_PHRASE: &str =
        "I don't have that figure on record. I can check with a person and follow up.";

    /// Note attached to a quote whose deposit is missing
    pub const DEPOSIT_UNAVAILABLE_NOTE: &str =
        "Deposit amount unavailable. I can check with a person and follow up.";

    /// Planning failed or timed out
    pub const PLANNING_APOLOGY: &str =
        "Sorry, I lost my train of thought there. Could you say that again?";

    /// Synthesis failed before the reply could be spoken
    pub const SPEECH_APOLOGY: &str = "Sorry, my voice cut out there. Could you ask that again?";

    /// Prefix for a failed tool call
    pub const TOOL_APOLOGY: &str = "Sorry, I couldn't complete that request.";

    /// Booking lost the race for a slot
    pub const SLOT_TAKEN: &str = "Slot no longer available";

    /// Asked when the planner found nothing actionable
    pub const CLARIFY: &str =
        "Could you tell me the area, number of bedrooms, or budget you have in mind?";

    /// Appended to agent text cut short by barge-in
    pub const INTERRUPTED_MARKER: &str = "[interrupted]";
}

/// Money formatting
pub mod currency {
    /// Label spoken before amounts
    pub const LABEL: &str = "PKR";
}

/// Timing defaults (milliseconds unless noted)
pub mod timing {
    pub const VAD_FRAME_MS: u64 = 20;
    pub const VAD_TRIGGER_MS: u64 = 160;
    pub const VAD_HANGOVER_MS: u64 = 300;
    pub const VAD_WATCHDOG_MS: u64 = 1_000;
    pub const RECONNECT_INITIAL_BACKOFF_MS: u64 = 200;
    pub const RECONNECT_MAX_BACKOFF_MS: u64 = 5_000;
    pub const PLANNING_TIMEOUT_MS: u64 = 4_000;
    pub const TOOL_TIMEOUT_MS: u64 = 3_000;
    pub const SPEECH_START_TIMEOUT_MS: u64 = 2_000;
    /// Upper bound on barge-in propagation
    pub const BARGE_IN_BUDGET_MS: u64 = 150;
}

/// Booking defaults
pub mod booking {
    pub const SLOT_DURATION_MINUTES: i64 = 30;
    pub const SLOT_TIMES: [&str; 3] = ["10:00", "12:30", "15:00"];
    pub const DEFAULT_DAYS_AHEAD: u32 = 14;
    pub const MAX_DAYS_AHEAD: u32 = 60;
}
