use crate::engine::{BookingError, CancelError};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: kind (regular|priority), outcome.
pub const BOOKINGS_TOTAL: &str = "roombook_bookings_total";

/// Histogram: booking latency in seconds, notifications included. Labels: kind.
pub const BOOKING_DURATION_SECONDS: &str = "roombook_booking_duration_seconds";

/// Counter: cancellation attempts. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "roombook_cancellations_total";

/// Counter: reservations cancelled by priority bookings.
pub const RESERVATIONS_PREEMPTED_TOTAL: &str = "roombook_reservations_preempted_total";

// ── Notification metrics ────────────────────────────────────────

/// Counter: outbound dispatches. Labels: status (delivered|failed).
pub const NOTIFICATIONS_TOTAL: &str = "roombook_notifications_total";

/// Histogram: wall time of one fan-out in seconds.
pub const FANOUT_DURATION_SECONDS: &str = "roombook_fanout_duration_seconds";

/// Counter: notification audit records that could not be written.
pub const AUDIT_WRITE_FAILURES_TOTAL: &str = "roombook_audit_write_failures_total";

// ── USE metrics (storage) ───────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "roombook_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (records per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "roombook_journal_flush_batch_size";

/// Counter: journal compactions. Labels: status.
pub const COMPACTIONS_TOTAL: &str = "roombook_compactions_total";

/// Map a booking result to a short label for metrics.
pub fn booking_label<T>(result: &Result<T, BookingError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(BookingError::PastDate) => "past_date",
        Err(BookingError::MinDuration { .. }) => "min_duration",
        Err(BookingError::RoomNotFound(_)) => "room_not_found",
        Err(BookingError::RoomUnavailable(_)) => "room_unavailable",
        Err(BookingError::SlotConflict { .. }) => "slot_conflict",
        Err(BookingError::Internal) => "internal",
    }
}

pub fn cancel_label<T>(result: &Result<T, CancelError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(CancelError::NotFound(_)) => "not_found",
        Err(CancelError::Forbidden(_)) => "forbidden",
        Err(CancelError::InvalidState(_)) => "invalid_state",
        Err(CancelError::Internal) => "internal",
    }
}
