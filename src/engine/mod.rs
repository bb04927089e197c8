mod availability;
mod conflict;
mod error;
mod mutations;
mod notices;
mod queries;
mod store;

pub use availability::free_windows;
pub use conflict::find_conflicts;
pub use error::{BookingError, CancelError, StorageError};
pub use store::{DayTxn, ReservationStore, SharedDay};

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::error;

use crate::audit::AuditLog;
use crate::config::EngineConfig;
use crate::directory::{DirectoryError, RoomDirectory, UserDirectory};
use crate::model::*;
use crate::notify::{Fanout, Notifier};

/// The external services the engine consults but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub rooms: Arc<dyn RoomDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct Engine {
    store: ReservationStore,
    audit: AuditLog,
    fanout: Fanout,
    rooms: Arc<dyn RoomDirectory>,
    users: Arc<dyn UserDirectory>,
    /// Bound on a room lookup, which may run while a day lock is held.
    lookup_timeout: Duration,
}

impl Engine {
    /// Replay both journals under `config.data_dir` and start their writers.
    /// Must be called inside a tokio runtime.
    pub fn open(config: &EngineConfig, collaborators: Collaborators) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = ReservationStore::open(&config.reservations_path())?;
        let audit = AuditLog::open(&config.notifications_path())?;
        Ok(Self::from_parts(store, audit, config, collaborators))
    }

    pub(crate) fn from_parts(
        store: ReservationStore,
        audit: AuditLog,
        config: &EngineConfig,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            store,
            audit,
            fanout: Fanout::new(collaborators.notifier, config.dispatch_timeout),
            rooms: collaborators.rooms,
            users: collaborators.users,
            lookup_timeout: config.dispatch_timeout,
        }
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Compact both journals, forgetting days and notifications before `keep_from`.
    pub async fn compact(&self, keep_from: NaiveDate) -> Result<(), StorageError> {
        self.store.compact(keep_from).await?;
        self.audit.compact(keep_from).await?;
        Ok(())
    }

    async fn lookup_room(&self, room_id: RoomId) -> Result<Option<Room>, DirectoryError> {
        tokio::time::timeout(self.lookup_timeout, self.rooms.room(room_id))
            .await
            .unwrap_or_else(|_| {
                Err(DirectoryError(format!(
                    "no answer within {}ms",
                    self.lookup_timeout.as_millis()
                )))
            })
    }

    /// Room exists and is open for booking.
    async fn bookable_room(&self, room_id: RoomId) -> Result<Room, BookingError> {
        let room = self
            .lookup_room(room_id)
            .await
            .map_err(|e| {
                error!(room_id, "room lookup failed: {e}");
                BookingError::Internal
            })?
            .ok_or(BookingError::RoomNotFound(room_id))?;
        if !room.is_available() {
            return Err(BookingError::RoomUnavailable(room_id));
        }
        Ok(room)
    }

    /// Display name for messages; falls back to the id when the directory can't say.
    async fn room_name(&self, room_id: RoomId) -> String {
        match self.lookup_room(room_id).await {
            Ok(Some(room)) => room.name,
            _ => format!("room #{room_id}"),
        }
    }
}
