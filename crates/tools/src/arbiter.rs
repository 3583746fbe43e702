//! Booking Arbiter
//!
//! Serializes competing reservations for the same `(unit, slot_start)`.
//! The check-and-create is delegated to the store's unique insert, so there
//! is no read-then-write window between sessions.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use voice_turn_config::constants::phrases;
use voice_turn_core::{Error, Result};
use voice_turn_persistence::{BookingStore, PersistenceError, ReservationStatus, SlotReservation};

pub struct BookingArbiter {
    store: Arc<dyn BookingStore>,
}

impl BookingArbiter {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Hold a slot. Exactly one of any set of concurrent callers wins;
    /// the rest get `Error::Conflict`.
    pub async fn reserve(
        &self,
        unit_id: &str,
        slot_start: DateTime<Utc>,
        slot_end: DateTime<Utc>,
        session_id: Option<&str>,
    ) -> Result<SlotReservation> {
        self.claim(SlotReservation::held(unit_id, slot_start, slot_end), session_id)
            .await
    }

    /// Reserve and confirm in a single insert
    ///
    /// There is no held row in between, so a caller that gives up mid-call
    /// leaves either nothing or a confirmed booking.
    pub async fn book(
        &self,
        unit_id: &str,
        slot_start: DateTime<Utc>,
        slot_end: DateTime<Utc>,
        session_id: Option<&str>,
    ) -> Result<SlotReservation> {
        self.claim(SlotReservation::confirmed(unit_id, slot_start, slot_end), session_id)
            .await
    }

    async fn claim(
        &self,
        mut reservation: SlotReservation,
        session_id: Option<&str>,
    ) -> Result<SlotReservation> {
        let (unit_id, slot_start) = (reservation.unit_id.clone(), reservation.slot_start);
        if reservation.slot_end <= slot_start {
            return Err(Error::Validation("slot_end must be after slot_start".to_string()));
        }
        if let Some(session_id) = session_id {
            reservation = reservation.with_session(session_id);
        }

        match self.store.insert_unique(reservation).await {
            Ok(row) => {
                tracing::debug!(
                    unit_id = %unit_id,
                    slot_start = %slot_start,
                    reservation_id = %row.reservation_id,
                    status = row.status.as_str(),
                    "Slot claimed"
                );
                Ok(row)
            },
            Err(PersistenceError::UniqueViolation { .. }) => {
                metrics::counter!("voice_turn_reservation_conflicts_total").increment(1);
                tracing::info!(unit_id = %unit_id, slot_start = %slot_start, "Reservation conflict");
                Err(Error::Conflict(phrases::SLOT_TAKEN.to_string()))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Held to confirmed; confirming twice is not an error
    pub async fn confirm(&self, reservation_id: Uuid) -> Result<SlotReservation> {
        match self
            .store
            .transition(reservation_id, &[ReservationStatus::Held], ReservationStatus::Confirmed)
            .await
        {
            Ok(row) => Ok(row),
            Err(PersistenceError::InvalidTransition(reason)) => {
                match self.store.get(reservation_id).await? {
                    Some(row) if row.status == ReservationStatus::Confirmed => Ok(row),
                    // released in between
                    _ => Err(Error::Conflict(reason)),
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Free the slot. Idempotent, and accepted for confirmed reservations.
    pub async fn release(&self, reservation_id: Uuid) -> Result<SlotReservation> {
        match self
            .store
            .transition(
                reservation_id,
                &[ReservationStatus::Held, ReservationStatus::Confirmed],
                ReservationStatus::Released,
            )
            .await
        {
            Ok(row) => {
                tracing::debug!(reservation_id = %reservation_id, unit_id = %row.unit_id, "Slot released");
                Ok(row)
            },
            Err(PersistenceError::InvalidTransition(reason)) => {
                match self.store.get(reservation_id).await? {
                    Some(row) if row.status == ReservationStatus::Released => Ok(row),
                    _ => Err(Error::Internal(reason)),
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Held and confirmed reservations starting within `[from, to)`
    pub async fn active_for_unit(
        &self,
        unit_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SlotReservation>> {
        Ok(self.store.active_for_unit(unit_id, from, to).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use voice_turn_core::ErrorKind;
    use voice_turn_persistence::InMemoryBookingStore;

    fn arbiter() -> BookingArbiter {
        BookingArbiter::new(Arc::new(InMemoryBookingStore::new()))
    }

    fn slot() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2030, 3, 4, 12, 30, 0).unwrap();
        (start, start + Duration::minutes(30))
    }

    #[tokio::test]
    async fn test_second_reserve_conflicts() {
        let arbiter = arbiter();
        let (start, end) = slot();

        arbiter.reserve("u1", start, end, Some("s1")).await.unwrap();
        let err = arbiter.reserve("u1", start, end, Some("s2")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Conflict: Slot no longer available");
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_frees_slot() {
        let arbiter = arbiter();
        let (start, end) = slot();

        let held = arbiter.reserve("u1", start, end, None).await.unwrap();
        arbiter.confirm(held.reservation_id).await.unwrap();
        arbiter.release(held.reservation_id).await.unwrap();
        let again = arbiter.release(held.reservation_id).await.unwrap();
        assert_eq!(again.status, ReservationStatus::Released);

        arbiter.reserve("u1", start, end, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_confirm_released_is_conflict() {
        let arbiter = arbiter();
        let (start, end) = slot();

        let held = arbiter.reserve("u1", start, end, None).await.unwrap();
        assert_eq!(
            arbiter.confirm(held.reservation_id).await.unwrap().status,
            ReservationStatus::Confirmed
        );
        // confirming twice is fine
        arbiter.confirm(held.reservation_id).await.unwrap();

        arbiter.release(held.reservation_id).await.unwrap();
        let err = arbiter.confirm(held.reservation_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_unknown_reservation_not_found() {
        let err = arbiter().release(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_empty_window_rejected() {
        let (start, _) = slot();
        let err = arbiter().reserve("u1", start, start, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_book_inserts_confirmed() {
        let store = Arc::new(InMemoryBookingStore::new());
        let arbiter = BookingArbiter::new(store.clone());
        let (start, end) = slot();

        let booked = arbiter.book("u1", start, end, Some("s1")).await.unwrap();
        assert_eq!(booked.status, ReservationStatus::Confirmed);
        assert_eq!(booked.session_id.as_deref(), Some("s1"));

        let err = arbiter.reserve("u1", start, end, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = arbiter.book("u1", start, end, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let rows = store.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ReservationStatus::Confirmed);
    }
}
