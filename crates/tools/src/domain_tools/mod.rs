//! Domain Tools
//!
//! The five grounded-data tools behind a rental viewing call.
//!
//! This module is organized into:
//! - `utils`: Cursor encoding, clocks and error mapping
//! - `areas`: Area alias resolution
//! - `tools`: Tool implementations

mod areas;
mod tools;
mod utils;

pub use areas::{find_area, resolve_area};
pub use utils::{decode_cursor, encode_cursor, system_clock, Clock};

pub use tools::{
    BookViewingTool, BookingConfirmation, ListSlotsTool, ListingCard, Quote, QuoteTotalTool,
    SearchListingsTool, SendFollowupTool, Slot, SlotList,
};
