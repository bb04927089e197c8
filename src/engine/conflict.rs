use std::collections::HashSet;

use chrono::{Local, NaiveDate};

use crate::limits::MIN_BOOKING_MINUTES;
use crate::model::*;

use super::{BookingError, StorageError};

/// Current local calendar day. Time of day plays no part in booking rules.
pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Slot preconditions that need no storage: not in the past, long enough.
pub(crate) fn validate_slot(
    date: NaiveDate,
    window: &TimeWindow,
    today: NaiveDate,
) -> Result<(), BookingError> {
    if date < today {
        return Err(BookingError::PastDate);
    }
    let actual = window.duration_minutes();
    if actual < MIN_BOOKING_MINUTES {
        return Err(BookingError::MinDuration {
            min: MIN_BOOKING_MINUTES,
            actual,
        });
    }
    Ok(())
}

/// Active reservations of the day overlapping `window`, ordered by start.
pub fn find_conflicts(
    day: &DayState,
    window: &TimeWindow,
    exclude: Option<ReservationId>,
) -> Vec<Reservation> {
    day.overlapping(window)
        .filter(|r| r.is_active() && Some(r.id) != exclude)
        .cloned()
        .collect()
}

/// Re-validate staged events against committed state before they hit the journal:
/// no staged insert may overlap an active reservation that survives the
/// transaction's own cancellations, nor another staged insert.
pub(crate) fn check_commit(day: &DayState, events: &[Event]) -> Result<(), StorageError> {
    let mut cancelled: HashSet<ReservationId> = HashSet::new();
    let mut inserted: Vec<&Reservation> = Vec::new();

    for event in events {
        match event {
            Event::ReservationsCancelled { ids, .. } => cancelled.extend(ids.iter().copied()),
            Event::IdFloor { .. } => {}
            Event::ReservationCreated { reservation } => {
                if !reservation.is_active() {
                    continue;
                }
                if let Some(hit) = day
                    .overlapping(&reservation.window)
                    .find(|r| r.is_active() && !cancelled.contains(&r.id))
                {
                    return Err(StorageError::Overlap(hit.id));
                }
                if let Some(hit) = inserted
                    .iter()
                    .find(|r| r.window.overlaps(&reservation.window))
                {
                    return Err(StorageError::Overlap(hit.id));
                }
                inserted.push(reservation);
            }
        }
    }
    Ok(())
}
