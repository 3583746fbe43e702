//! Grounded-data tools for the voice-turn orchestrator
//!
//! Five tools backed by the persistence ports, a router that validates and
//! times out calls, the grounding guard that keeps unsourced numbers out of
//! speech, and the Booking Arbiter that serializes slot reservations.

pub mod arbiter;
pub mod domain_tools;
pub mod grounding;
pub mod registry;

pub use arbiter::BookingArbiter;
pub use domain_tools::{
    decode_cursor, encode_cursor, find_area, resolve_area, system_clock, BookViewingTool,
    BookingConfirmation, Clock, ListSlotsTool, ListingCard, Quote, QuoteTotalTool,
    SearchListingsTool, SendFollowupTool, Slot, SlotList,
};
pub use grounding::{format_amount, numbers_in, Figure, GroundingGuard};
pub use registry::{create_router, ToolExecutor, ToolRouter};
