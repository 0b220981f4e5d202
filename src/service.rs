//! Message canonicalization
//!
//! `MessageService` turns raw inbound frames into persisted, server-stamped
//! canonical payloads and replays a room's history in timestamp order.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::error::{ProcessError, RepositoryError};
use crate::message::{Message, Payload};
use crate::repository::MessageRepository;
use crate::types::HubId;

/// Source of the server's notion of "now"
pub trait Clock: Send + Sync {
    /// Current unix time in whole seconds, UTC
    fn now_unix(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Validates, stamps, persists and serializes chat messages
pub struct MessageService {
    repository: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl MessageService {
    /// Create a service stamping messages with the wall clock
    pub fn new(repository: Arc<dyn MessageRepository>) -> Self {
        Self::with_clock(repository, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<dyn MessageRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Turn a raw inbound frame into its canonical payload
    ///
    /// Client-supplied `id` and `created_at` are discarded: the timestamp is
    /// taken here and the id comes from the repository.
    pub async fn process(&self, hub_id: &HubId, raw: &[u8]) -> Result<Payload, ProcessError> {
        let mut message = Message::from_slice(raw).map_err(ProcessError::Deserialization)?;

        message.id.clear();
        message.created_at = self.clock.now_unix();
        self.repository.add_message(hub_id, &mut message).await?;
        debug!("Hub {} persisted message {}", hub_id, message.id);

        message.to_payload().map_err(ProcessError::Serialization)
    }

    /// The room's full history as canonical payloads, oldest first
    ///
    /// Never fails: a failed read is logged and whatever was recovered is
    /// returned. Messages sharing a timestamp keep the repository's order.
    pub async fn get_message_collection(&self, hub_id: &HubId) -> Vec<Payload> {
        let mut messages = match self.repository.get_message_collection(hub_id).await {
            Ok(messages) => messages,
            Err(RepositoryError::Partial { recovered, reason }) => {
                warn!(
                    "Hub {} history read incomplete ({} recovered): {}",
                    hub_id,
                    recovered.len(),
                    reason
                );
                recovered
            }
            Err(e) => {
                warn!("Hub {} history unavailable: {}", hub_id, e);
                Vec::new()
            }
        };

        messages.sort_by_key(|m| m.created_at);

        let mut payloads = Vec::with_capacity(messages.len());
        for message in &messages {
            match message.to_payload() {
                Ok(payload) => payloads.push(payload),
                Err(e) => {
                    error!("Hub {} failed to encode message {}: {}", hub_id, message.id, e);
                    break;
                }
            }
        }
        payloads
    }
}

impl std::fmt::Debug for MessageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryMessageRepository, MockMessageRepository};

    /// Clock frozen at a fixed instant
    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_unix(&self) -> i64 {
            self.0
        }
    }

    fn decode(payload: &Payload) -> Message {
        serde_json::from_slice(payload).unwrap()
    }

    fn stored(id: &str, created_at: i64) -> Message {
        Message {
            id: id.to_string(),
            author: "alice".to_string(),
            content: id.to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_process_stamps_and_persists() {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let service = MessageService::with_clock(repo.clone(), Arc::new(FixedClock(1_700_000_123)));
        let hub = HubId::new();

        let payload = service
            .process(&hub, br#"{"author":"alice","content":"hi"}"#)
            .await
            .unwrap();

        let msg = decode(&payload);
        assert!(!msg.id.is_empty());
        assert_eq!(msg.author, "alice");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.created_at, 1_700_000_123);

        let history = repo.get_message_collection(&hub).await.unwrap();
        assert_eq!(history, vec![msg]);
    }

    #[tokio::test]
    async fn test_process_overrides_client_supplied_fields() {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let service = MessageService::with_clock(repo, Arc::new(FixedClock(42)));

        let payload = service
            .process(
                &HubId::new(),
                br#"{"id":"forged","author":"mallory","content":"x","created_at":1}"#,
            )
            .await
            .unwrap();

        let msg = decode(&payload);
        assert_ne!(msg.id, "forged");
        assert_eq!(msg.created_at, 42);
    }

    #[tokio::test]
    async fn test_process_fills_missing_fields_with_defaults() {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let service = MessageService::with_clock(repo.clone(), Arc::new(FixedClock(7)));
        let hub = HubId::new();

        let msg = decode(&service.process(&hub, br#"{"content":"hi"}"#).await.unwrap());
        assert_eq!(msg.author, "");
        assert_eq!(msg.content, "hi");
        assert!(msg.is_persisted());

        let msg = decode(
            &service
                .process(
                    &hub,
                    br#"{"id":null,"author":"a","content":"b","created_at":null}"#,
                )
                .await
                .unwrap(),
        );
        assert_eq!(msg.author, "a");
        assert_eq!(msg.created_at, 7);

        assert_eq!(repo.get_message_collection(&hub).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_process_rejects_malformed_frame() {
        let mut repo = MockMessageRepository::new();
        repo.expect_add_message().never();
        let service = MessageService::new(Arc::new(repo));

        let result = service.process(&HubId::new(), b"{not json").await;
        assert!(matches!(result, Err(ProcessError::Deserialization(_))));
    }

    #[tokio::test]
    async fn test_process_reports_persistence_failure() {
        let mut repo = MockMessageRepository::new();
        repo.expect_add_message()
            .times(1)
            .returning(|_, _| Err(RepositoryError::Unavailable("disk full".to_string())));
        let service = MessageService::new(Arc::new(repo));

        let result = service
            .process(&HubId::new(), br#"{"author":"a","content":"b"}"#)
            .await;
        assert!(matches!(
            result,
            Err(ProcessError::Persistence(RepositoryError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_history_sorted_stable_by_created_at() {
        let mut repo = MockMessageRepository::new();
        repo.expect_get_message_collection().returning(|_| {
            Ok(vec![
                stored("c", 30),
                stored("a1", 10),
                stored("b", 20),
                stored("a2", 10),
            ])
        });
        let service = MessageService::new(Arc::new(repo));

        let ids: Vec<String> = service
            .get_message_collection(&HubId::new())
            .await
            .iter()
            .map(|p| decode(p).id)
            .collect();
        assert_eq!(ids, vec!["a1", "a2", "b", "c"]);
    }

    #[tokio::test]
    async fn test_history_keeps_partial_results() {
        let mut repo = MockMessageRepository::new();
        repo.expect_get_message_collection().returning(|_| {
            Err(RepositoryError::Partial {
                recovered: vec![stored("late", 5), stored("early", 1)],
                reason: "connection reset".to_string(),
            })
        });
        let service = MessageService::new(Arc::new(repo));

        let ids: Vec<String> = service
            .get_message_collection(&HubId::new())
            .await
            .iter()
            .map(|p| decode(p).id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_history_unavailable_is_empty() {
        let mut repo = MockMessageRepository::new();
        repo.expect_get_message_collection()
            .returning(|_| Err(RepositoryError::Unavailable("down".to_string())));
        let service = MessageService::new(Arc::new(repo));

        assert!(service.get_message_collection(&HubId::new()).await.is_empty());
    }
}
