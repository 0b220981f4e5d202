//! Message persistence
//!
//! `MessageRepository` is the storage seam every hub persists through.
//! Implementations must tolerate concurrent calls from many hub loops;
//! the callers add no locking of their own.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::message::Message;
use crate::types::HubId;

/// Per-room message storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist `message` under `hub_id`, assigning `message.id`
    async fn add_message(&self, hub_id: &HubId, message: &mut Message)
        -> Result<(), RepositoryError>;

    /// All messages stored for `hub_id`, in no particular order
    ///
    /// A failure part-way through may be reported as
    /// [`RepositoryError::Partial`] carrying the messages read so far.
    async fn get_message_collection(&self, hub_id: &HubId) -> Result<Vec<Message>, RepositoryError>;
}

/// HashMap-backed repository, one message list per hub
///
/// Reads come back stable-sorted by `created_at`, so messages stamped in the
/// same second keep their insertion order.
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    rooms: RwLock<HashMap<HubId, Vec<Message>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages stored for a hub
    pub async fn len(&self, hub_id: &HubId) -> usize {
        self.rooms.read().await.get(hub_id).map_or(0, Vec::len)
    }

    pub async fn is_empty(&self, hub_id: &HubId) -> bool {
        self.len(hub_id).await == 0
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn add_message(
        &self,
        hub_id: &HubId,
        message: &mut Message,
    ) -> Result<(), RepositoryError> {
        message.id = Uuid::new_v4().to_string();
        debug!("Storing message {} in hub {}", message.id, hub_id);

        self.rooms
            .write()
            .await
            .entry(*hub_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_message_collection(&self, hub_id: &HubId) -> Result<Vec<Message>, RepositoryError> {
        let mut messages = self
            .rooms
            .read()
            .await
            .get(hub_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}
