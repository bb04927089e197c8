//! Read-only views of rooms and users owned by other parts of the system.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Contact, Room, RoomId, UserId};

#[derive(Debug, Error)]
#[error("directory lookup failed: {0}")]
pub struct DirectoryError(pub String);

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn room(&self, id: RoomId) -> Result<Option<Room>, DirectoryError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Everyone who receives roster-wide announcements.
    async fn roster(&self) -> Result<Vec<Contact>, DirectoryError>;

    async fn contact(&self, user_id: UserId) -> Result<Option<Contact>, DirectoryError> {
        Ok(self
            .roster()
            .await?
            .into_iter()
            .find(|c| c.user_id == user_id))
    }
}
