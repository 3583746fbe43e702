//! Listing catalog
//!
//! Amounts are integer minor units. A `None` amount means the figure is not
//! on record and must never be replaced by an estimate.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::PersistenceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub line: String,
    pub area: String,
    pub city: String,
}

impl Address {
    pub fn one_line(&self) -> String {
        format!("{}, {}, {}", self.line, self.area, self.city)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub name: String,
    pub amount: i64,
}

/// One rentable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub unit_id: String,
    pub property_id: String,
    pub title: String,
    pub rent: i64,
    pub deposit: Option<i64>,
    #[serde(default)]
    pub fees: Vec<Fee>,
    #[serde(default)]
    pub utilities_included: Vec<String>,
    pub notes: Option<String>,
    pub beds: u32,
    pub baths: u32,
    pub sqft: Option<u32>,
    pub furnished: bool,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub address: Address,
    #[serde(default)]
    pub images: Vec<String>,
    pub available_from: Option<NaiveDate>,
    /// Last day the unit can be viewed; open-ended if absent
    pub available_until: Option<NaiveDate>,
}

impl Listing {
    pub fn is_available_on(&self, date: NaiveDate) -> bool {
        let after_start = self.available_from.map_or(true, |from| date >= from);
        let before_end = self.available_until.map_or(true, |until| date <= until);
        after_start && before_end
    }

    fn matches_location(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.address.city, &self.address.area, &self.address.line]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    fn has_amenity(&self, wanted: &str) -> bool {
        self.amenities.iter().any(|a| a.eq_ignore_ascii_case(wanted))
    }
}

/// Search criteria plus keyset position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingQuery {
    pub location: Option<String>,
    pub rent_min: Option<i64>,
    pub rent_max: Option<i64>,
    pub beds: Option<u32>,
    pub baths: Option<u32>,
    pub furnished: Option<bool>,
    pub amenities: Vec<String>,
    pub available_from: Option<NaiveDate>,
    /// Return only rows strictly after this `(rent, unit_id)`
    pub after: Option<(i64, String)>,
    pub limit: usize,
}

impl ListingQuery {
    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(location) = &self.location {
            if !listing.matches_location(location) {
                return false;
            }
        }
        if self.rent_min.map_or(false, |min| listing.rent < min) {
            return false;
        }
        if self.rent_max.map_or(false, |max| listing.rent > max) {
            return false;
        }
        if self.beds.map_or(false, |beds| listing.beds < beds) {
            return false;
        }
        if self.baths.map_or(false, |baths| listing.baths < baths) {
            return false;
        }
        if self.furnished.map_or(false, |f| listing.furnished != f) {
            return false;
        }
        if !self.amenities.iter().all(|a| listing.has_amenity(a)) {
            return false;
        }
        if let Some(wanted) = self.available_from {
            // must be free to move in on or before the requested date
            if listing.available_from.map_or(false, |from| from > wanted) {
                return false;
            }
        }
        true
    }
}

/// Read access to the listing catalog
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Matching listings ordered by `(rent, unit_id)`, at most `query.limit`
    async fn search(&self, query: &ListingQuery) -> Result<Vec<Listing>, PersistenceError>;

    async fn get(&self, unit_id: &str) -> Result<Option<Listing>, PersistenceError>;
}

/// In-memory catalog keyed by unit id
#[derive(Debug, Default)]
pub struct InMemoryListingStore {
    listings: RwLock<BTreeMap<String, Listing>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
        let store = Self::new();
        for listing in listings {
            store.upsert(listing);
        }
        store
    }

    pub fn upsert(&self, listing: Listing) {
        self.listings.write().insert(listing.unit_id.clone(), listing);
    }

    pub fn len(&self) -> usize {
        self.listings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.read().is_empty()
    }
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn search(&self, query: &ListingQuery) -> Result<Vec<Listing>, PersistenceError> {
        let listings = self.listings.read();
        let mut matched: Vec<&Listing> = listings
            .values()
            .filter(|l| query.matches(l))
            .filter(|l| match &query.after {
                Some((rent, unit_id)) => (l.rent, &l.unit_id) > (*rent, unit_id),
                None => true,
            })
            .collect();
        matched.sort_by(|a, b| (a.rent, &a.unit_id).cmp(&(b.rent, &b.unit_id)));

        Ok(matched.into_iter().take(query.limit).cloned().collect())
    }

    async fn get(&self, unit_id: &str) -> Result<Option<Listing>, PersistenceError> {
        Ok(self.listings.read().get(unit_id).cloned())
    }
}
