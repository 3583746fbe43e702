//! Data-service ports and in-memory stores
//!
//! Provides storage for:
//! - Listings (catalog with demo seed)
//! - Slot reservations (unique on unit + slot start)
//! - Leads
//! - Follow-up outbox

pub mod error;
pub mod followups;
pub mod leads;
pub mod listings;
pub mod reservations;
pub mod seed;

pub use error::PersistenceError;
pub use followups::{
    FollowupChannel, FollowupMessage, FollowupSender, FollowupStatus, OutboxFollowupSender,
};
pub use leads::{Contact, InMemoryLeadStore, Lead, LeadStage, LeadStore};
pub use listings::{Address, Fee, InMemoryListingStore, Listing, ListingQuery, ListingStore};
pub use reservations::{BookingStore, InMemoryBookingStore, ReservationStatus, SlotReservation};

use chrono::NaiveDate;
use std::sync::Arc;

/// Combined persistence layer with all services
#[derive(Clone)]
pub struct PersistenceLayer {
    pub listings: Arc<dyn ListingStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub leads: Arc<dyn LeadStore>,
    pub followups: Arc<dyn FollowupSender>,
}

/// In-memory layer seeded with the demo catalog
pub fn in_memory(today: NaiveDate) -> PersistenceLayer {
    PersistenceLayer {
        listings: Arc::new(InMemoryListingStore::with_listings(seed::demo_listings(today))),
        bookings: Arc::new(InMemoryBookingStore::new()),
        leads: Arc::new(InMemoryLeadStore::new()),
        followups: Arc::new(OutboxFollowupSender::new()),
    }
}
