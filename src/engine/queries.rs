use chrono::NaiveDate;

use crate::model::*;

use super::availability;
use super::conflict;
use super::Engine;

impl Engine {
    /// Active reservations overlapping `window` as of the last commit. Advisory:
    /// bookings re-check under the day's write lock.
    pub async fn find_conflicts(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        window: &TimeWindow,
        exclude: Option<ReservationId>,
    ) -> Vec<Reservation> {
        let Some(day) = self.store.get_day(&DayKey::new(room_id, date)) else {
            return Vec::new();
        };
        let guard = day.read().await;
        conflict::find_conflicts(&guard, window, exclude)
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.store.get(id).await
    }

    /// Every reservation of the day, cancelled ones included, ordered by start.
    pub async fn reservations_on(&self, room_id: RoomId, date: NaiveDate) -> Vec<Reservation> {
        self.store
            .snapshot(&DayKey::new(room_id, date))
            .await
            .map(|day| day.reservations)
            .unwrap_or_default()
    }

    pub async fn reservations_for_user(&self, user_id: UserId) -> Vec<Reservation> {
        let mut mine: Vec<Reservation> = self
            .store
            .all_reservations()
            .await
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        mine.sort_by_key(|r| (r.date, r.window.start, r.room_id));
        mine
    }

    /// Gaps in the day's active bookings, optionally only those of at least `min_minutes`.
    pub async fn free_windows(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        min_minutes: Option<Minutes>,
    ) -> Vec<TimeWindow> {
        let day = self
            .store
            .snapshot(&DayKey::new(room_id, date))
            .await
            .unwrap_or_else(|| DayState::new(DayKey::new(room_id, date)));
        availability::free_windows(&day, min_minutes)
    }

    pub fn notifications_for_user(&self, user_id: UserId) -> Vec<NotificationRecord> {
        self.audit.for_user(user_id)
    }

    pub fn unread_notifications(&self, user_id: UserId) -> usize {
        self.audit.unread_count(user_id)
    }
}
