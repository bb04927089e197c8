use std::time::Instant;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::model::*;
use crate::observability::{self, booking_label, cancel_label};

use super::conflict::{today, validate_slot};
use super::{BookingError, CancelError, Engine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookingKind {
    Regular,
    Priority,
}

impl BookingKind {
    fn label(self) -> &'static str {
        match self {
            BookingKind::Regular => "regular",
            BookingKind::Priority => "priority",
        }
    }
}

impl Engine {
    /// Book a slot, rejecting it if any active reservation overlaps.
    /// Everyone on the roster is told once the booking is committed.
    pub async fn create_reservation(
        &self,
        requester: &Principal,
        room_id: RoomId,
        date: NaiveDate,
        window: TimeWindow,
        reason: Option<String>,
    ) -> Result<BookingResult, BookingError> {
        self.timed_booking(BookingKind::Regular, requester, room_id, date, window, reason)
            .await
    }

    /// Book a slot, cancelling every overlapping active reservation in the same
    /// transaction. The caller is responsible for checking that `admin` may do this.
    pub async fn create_priority_reservation(
        &self,
        admin: &Principal,
        room_id: RoomId,
        date: NaiveDate,
        window: TimeWindow,
        reason: Option<String>,
    ) -> Result<BookingResult, BookingError> {
        self.timed_booking(BookingKind::Priority, admin, room_id, date, window, reason)
            .await
    }

    async fn timed_booking(
        &self,
        kind: BookingKind,
        requester: &Principal,
        room_id: RoomId,
        date: NaiveDate,
        window: TimeWindow,
        reason: Option<String>,
    ) -> Result<BookingResult, BookingError> {
        let started = Instant::now();
        let result = self.book(kind, requester, room_id, date, window, reason).await;
        metrics::counter!(
            observability::BOOKINGS_TOTAL,
            "kind" => kind.label(),
            "outcome" => booking_label(&result)
        )
        .increment(1);
        metrics::histogram!(observability::BOOKING_DURATION_SECONDS, "kind" => kind.label())
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn book(
        &self,
        kind: BookingKind,
        requester: &Principal,
        room_id: RoomId,
        date: NaiveDate,
        window: TimeWindow,
        reason: Option<String>,
    ) -> Result<BookingResult, BookingError> {
        let mut txn = self.store.begin(DayKey::new(room_id, date)).await;

        validate_slot(date, &window, today())?;
        let room = self.bookable_room(room_id).await?;

        let conflicts = txn.find_conflicts(&window, None);
        if kind == BookingKind::Regular && !conflicts.is_empty() {
            return Err(BookingError::SlotConflict {
                conflicting: conflicts.iter().map(|r| r.id).collect(),
            });
        }

        let now = Utc::now();
        let reservation = Reservation {
            id: self.store.allocate_id(),
            user_id: requester.id,
            room_id,
            date,
            window,
            reason,
            status: ReservationStatus::Active,
            created_at: now,
            updated_at: now,
        };
        txn.cancel_all(conflicts.iter().map(|r| r.id).collect(), now);
        txn.insert(reservation.clone());
        txn.commit().await?;

        let preempted: Vec<Reservation> = conflicts
            .into_iter()
            .map(|mut r| {
                r.status = ReservationStatus::Cancelled;
                r.updated_at = now;
                r
            })
            .collect();

        info!(
            reservation_id = reservation.id,
            room_id,
            %date,
            %window,
            user_id = requester.id,
            kind = kind.label(),
            preempted = preempted.len(),
            "reservation created"
        );
        if !preempted.is_empty() {
            metrics::counter!(observability::RESERVATIONS_PREEMPTED_TOTAL)
                .increment(preempted.len() as u64);
        }

        let details = ReservationDetails {
            reservation,
            room_name: room.name,
            owner_name: requester.display_name.clone(),
        };
        let (notified, audit_recorded) = match kind {
            BookingKind::Regular => self.announce_created(&details).await,
            BookingKind::Priority => self.announce_priority(requester, &details, &preempted).await,
        };

        Ok(BookingResult {
            details,
            notified,
            audit_recorded,
            preempted,
        })
    }

    /// Cancel a reservation on behalf of its owner or an administrator.
    pub async fn cancel_reservation(
        &self,
        requester: &Principal,
        reservation_id: ReservationId,
    ) -> Result<CancelResult, CancelError> {
        let result = self.cancel(requester, reservation_id).await;
        metrics::counter!(observability::CANCELLATIONS_TOTAL, "outcome" => cancel_label(&result))
            .increment(1);
        result
    }

    async fn cancel(
        &self,
        requester: &Principal,
        reservation_id: ReservationId,
    ) -> Result<CancelResult, CancelError> {
        let mut txn = self
            .store
            .begin_for(reservation_id)
            .await
            .ok_or(CancelError::NotFound(reservation_id))?;

        let current = txn
            .reservation(reservation_id)
            .cloned()
            .ok_or(CancelError::NotFound(reservation_id))?;
        if current.user_id != requester.id && !requester.role.is_admin() {
            return Err(CancelError::Forbidden(reservation_id));
        }
        if !current.is_active() {
            return Err(CancelError::InvalidState(reservation_id));
        }

        let now = Utc::now();
        txn.cancel_all(vec![reservation_id], now);
        txn.commit().await?;

        let reservation = Reservation {
            status: ReservationStatus::Cancelled,
            updated_at: now,
            ..current
        };
        info!(
            reservation_id,
            room_id = reservation.room_id,
            date = %reservation.date,
            by = requester.id,
            "reservation cancelled"
        );

        let (notified, audit_recorded) = self.announce_cancelled(requester, &reservation).await;
        Ok(CancelResult {
            reservation,
            notified,
            audit_recorded,
        })
    }
}
