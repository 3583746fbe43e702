//! Domain Tool Implementations
//!
//! Each tool is in its own module and reads only from its backing store.

mod booking;
mod followup;
mod quote;
mod search;
mod slots;

pub use booking::{BookViewingTool, BookingConfirmation};
pub use followup::SendFollowupTool;
pub use quote::{Quote, QuoteTotalTool};
pub use search::{ListingCard, SearchListingsTool};
pub use slots::{ListSlotsTool, Slot, SlotList};
