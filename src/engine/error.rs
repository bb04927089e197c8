use thiserror::Error;

use crate::model::{ReservationId, RoomId};

/// Failure to persist a transaction.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("journal error: {0}")]
    Journal(#[from] std::io::Error),
    /// Commit-time re-validation found a staged insert overlapping an active reservation.
    #[error("commit would overlap active reservation {0}")]
    Overlap(ReservationId),
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("cannot book a date in the past")]
    PastDate,
    #[error("reservation must last at least {min} minutes, got {actual}")]
    MinDuration { min: u32, actual: u32 },
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("room {0} is not available for booking")]
    RoomUnavailable(RoomId),
    #[error("time slot conflicts with reservations {conflicting:?}")]
    SlotConflict { conflicting: Vec<ReservationId> },
    /// Storage or collaborator failure. Details are logged, not carried.
    #[error("internal error")]
    Internal,
}

#[derive(Debug, Error)]
pub enum CancelError {
    #[error("reservation not found: {0}")]
    NotFound(ReservationId),
    #[error("not allowed to cancel reservation {0}")]
    Forbidden(ReservationId),
    #[error("reservation {0} is already cancelled")]
    InvalidState(ReservationId),
    #[error("internal error")]
    Internal,
}

impl From<StorageError> for BookingError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Overlap(id) => BookingError::SlotConflict { conflicting: vec![id] },
            StorageError::Journal(e) => {
                tracing::error!("booking commit failed: {e}");
                BookingError::Internal
            }
        }
    }
}

impl From<StorageError> for CancelError {
    fn from(e: StorageError) -> Self {
        tracing::error!("cancellation commit failed: {e}");
        CancelError::Internal
    }
}
