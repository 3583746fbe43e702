//! Slot reservation table
//!
//! The table enforces a uniqueness constraint on `(unit_id, slot_start)`
//! across held and confirmed rows. Released rows stay for audit but no
//! longer occupy the key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Held,
    Confirmed,
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Confirmed => "confirmed",
            Self::Released => "released",
        }
    }

    /// Held and confirmed rows occupy their slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Held | Self::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotReservation {
    pub reservation_id: Uuid,
    pub unit_id: String,
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    pub status: ReservationStatus,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlotReservation {
    /// A new held reservation
    pub fn held(unit_id: &str, slot_start: DateTime<Utc>, slot_end: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            reservation_id: Uuid::new_v4(),
            unit_id: unit_id.to_string(),
            slot_start,
            slot_end,
            status: ReservationStatus::Held,
            session_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A reservation that is confirmed on insert
    pub fn confirmed(unit_id: &str, slot_start: DateTime<Utc>, slot_end: DateTime<Utc>) -> Self {
        Self {
            status: ReservationStatus::Confirmed,
            ..Self::held(unit_id, slot_start, slot_end)
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Reservation storage port
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Atomically insert unless an active row holds the same key
    async fn insert_unique(
        &self,
        reservation: SlotReservation,
    ) -> Result<SlotReservation, PersistenceError>;

    async fn get(&self, reservation_id: Uuid) -> Result<Option<SlotReservation>, PersistenceError>;

    /// Compare-and-set the status; fails if the current status is not in `from`
    async fn transition(
        &self,
        reservation_id: Uuid,
        from: &[ReservationStatus],
        to: ReservationStatus,
    ) -> Result<SlotReservation, PersistenceError>;

    /// Active rows for a unit starting within `[from, to)`
    async fn active_for_unit(
        &self,
        unit_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SlotReservation>, PersistenceError>;
}

type SlotKey = (String, DateTime<Utc>);

/// In-memory reservation table
///
/// `active` is the unique index. Inserts write `rows` while holding the
/// `active` entry; transitions drop their `rows` guard before touching
/// `active`, so nothing waits on `active` while holding `rows`.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    rows: DashMap<Uuid, SlotReservation>,
    active: DashMap<SlotKey, Uuid>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row, including released ones
    pub fn all(&self) -> Vec<SlotReservation> {
        let mut rows: Vec<SlotReservation> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|r| r.created_at);
        rows
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert_unique(
        &self,
        reservation: SlotReservation,
    ) -> Result<SlotReservation, PersistenceError> {
        if !reservation.status.is_active() {
            return Err(PersistenceError::InvalidData(
                "only held or confirmed reservations can be inserted".to_string(),
            ));
        }

        let key = (reservation.unit_id.clone(), reservation.slot_start);
        match self.active.entry(key) {
            Entry::Occupied(_) => Err(PersistenceError::UniqueViolation {
                unit_id: reservation.unit_id,
                slot_start: reservation.slot_start,
            }),
            Entry::Vacant(slot) => {
                self.rows.insert(reservation.reservation_id, reservation.clone());
                slot.insert(reservation.reservation_id);
                Ok(reservation)
            },
        }
    }

    async fn get(&self, reservation_id: Uuid) -> Result<Option<SlotReservation>, PersistenceError> {
        Ok(self.rows.get(&reservation_id).map(|r| r.value().clone()))
    }

    async fn transition(
        &self,
        reservation_id: Uuid,
        from: &[ReservationStatus],
        to: ReservationStatus,
    ) -> Result<SlotReservation, PersistenceError> {
        let updated = {
            let mut row = self
                .rows
                .get_mut(&reservation_id)
                .ok_or_else(|| PersistenceError::NotFound(format!("reservation {}", reservation_id)))?;

            if !from.contains(&row.status) {
                return Err(PersistenceError::InvalidTransition(format!(
                    "reservation {} is {}, cannot become {}",
                    reservation_id,
                    row.status.as_str(),
                    to.as_str()
                )));
            }
            row.status = to;
            row.updated_at = Utc::now();
            row.clone()
        };

        if !to.is_active() {
            let key = (updated.unit_id.clone(), updated.slot_start);
            self.active.remove_if(&key, |_, id| *id == reservation_id);
        }

        Ok(updated)
    }

    async fn active_for_unit(
        &self,
        unit_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SlotReservation>, PersistenceError> {
        let mut rows: Vec<SlotReservation> = self
            .rows
            .iter()
            .filter(|r| {
                r.unit_id == unit_id && r.status.is_active() && r.slot_start >= from && r.slot_start < to
            })
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| r.slot_start);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn slot() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2030, 1, 2, 10, 0, 0).unwrap();
        (start, start + Duration::minutes(30))
    }

    #[tokio::test]
    async fn test_unique_key_rejects_second_active_row() {
        let store = InMemoryBookingStore::new();
        let (start, end) = slot();

        store.insert_unique(SlotReservation::held("u1", start, end)).await.unwrap();
        let err = store
            .insert_unique(SlotReservation::held("u1", start, end))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::UniqueViolation { .. }));

        // different unit, same time is fine
        store.insert_unique(SlotReservation::held("u2", start, end)).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_frees_key_and_keeps_row() {
        let store = InMemoryBookingStore::new();
        let (start, end) = slot();

        let first = store.insert_unique(SlotReservation::held("u1", start, end)).await.unwrap();
        store
            .transition(
                first.reservation_id,
                &[ReservationStatus::Held],
                ReservationStatus::Released,
            )
            .await
            .unwrap();

        store.insert_unique(SlotReservation::held("u1", start, end)).await.unwrap();
        assert_eq!(store.all().len(), 2);

        let active = store
            .active_for_unit("u1", start, start + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_checks_current_status() {
        let store = InMemoryBookingStore::new();
        let (start, end) = slot();
        let row = store.insert_unique(SlotReservation::held("u1", start, end)).await.unwrap();

        let err = store
            .transition(
                row.reservation_id,
                &[ReservationStatus::Confirmed],
                ReservationStatus::Released,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidTransition(_)));

        let err = store
            .transition(Uuid::new_v4(), &[ReservationStatus::Held], ReservationStatus::Released)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }
}
