use crate::limits::MINUTES_PER_DAY;
use crate::model::*;

/// Gaps in `[00:00, 24:00)` not covered by an active reservation, at least
/// `min_minutes` long when given.
///
/// One pass over `day.active()`, which yields rows in start order. The cursor
/// only moves forward, so overlapping or nested rows from old journals still
/// produce disjoint gaps.
pub fn free_windows(day: &DayState, min_minutes: Option<Minutes>) -> Vec<TimeWindow> {
    let long_enough =
        |start: Minutes, end: Minutes| end > start && min_minutes.is_none_or(|min| end - start >= min);

    let mut free = Vec::new();
    let mut cursor: Minutes = 0;
    for taken in day.active().map(|r| r.window) {
        if long_enough(cursor, taken.start) {
            free.push(TimeWindow::new(cursor, taken.start));
        }
        cursor = cursor.max(taken.end);
    }
    if long_enough(cursor, MINUTES_PER_DAY) {
        free.push(TimeWindow::new(cursor, MINUTES_PER_DAY));
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    const H: Minutes = 60;

    fn w(start: Minutes, end: Minutes) -> TimeWindow {
        TimeWindow::new(start, end)
    }

    fn day_with(windows: &[(Minutes, Minutes, ReservationStatus)]) -> DayState {
        let key = DayKey::new(1, NaiveDate::from_ymd_opt(2030, 3, 4).unwrap());
        let mut day = DayState::new(key);
        for (i, &(start, end, status)) in windows.iter().enumerate() {
            let now = Utc::now();
            day.insert_reservation(Reservation {
                id: i as ReservationId + 1,
                user_id: 1,
                room_id: key.room_id,
                date: key.date,
                window: w(start, end),
                reason: None,
                status,
                created_at: now,
                updated_at: now,
            });
        }
        day
    }

    #[test]
    fn empty_day_is_fully_free() {
        let day = day_with(&[]);
        assert_eq!(free_windows(&day, None), vec![w(0, MINUTES_PER_DAY)]);
    }

    #[test]
    fn cancelled_reservations_do_not_block() {
        let day = day_with(&[
            (9 * H, 10 * H, ReservationStatus::Active),
            (10 * H, 12 * H, ReservationStatus::Cancelled),
        ]);
        assert_eq!(
            free_windows(&day, None),
            vec![w(0, 9 * H), w(10 * H, MINUTES_PER_DAY)]
        );
    }

    #[test]
    fn min_length_filters_gaps() {
        let day = day_with(&[
            (9 * H, 10 * H, ReservationStatus::Active),
            (10 * H + 30, 12 * H, ReservationStatus::Active),
        ]);
        let free = free_windows(&day, Some(60));
        assert_eq!(free, vec![w(0, 9 * H), w(12 * H, MINUTES_PER_DAY)]);
    }

    #[test]
    fn back_to_back_bookings_leave_no_gap() {
        let day = day_with(&[
            (8 * H, 9 * H, ReservationStatus::Active),
            (9 * H, 10 * H, ReservationStatus::Active),
            (0, 30, ReservationStatus::Active),
        ]);
        assert_eq!(
            free_windows(&day, None),
            vec![w(30, 8 * H), w(10 * H, MINUTES_PER_DAY)]
        );
    }

    #[test]
    fn nested_rows_do_not_reopen_time() {
        let day = day_with(&[
            (9 * H, 13 * H, ReservationStatus::Active),
            (10 * H, 11 * H, ReservationStatus::Active),
        ]);
        assert_eq!(
            free_windows(&day, None),
            vec![w(0, 9 * H), w(13 * H, MINUTES_PER_DAY)]
        );
    }

    #[test]
    fn fully_booked_day_has_nothing_free() {
        let day = day_with(&[
            (0, 12 * H, ReservationStatus::Active),
            (12 * H, MINUTES_PER_DAY, ReservationStatus::Active),
        ]);
        assert!(free_windows(&day, None).is_empty());
    }
}
