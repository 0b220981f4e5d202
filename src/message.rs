//! Chat message wire format
//!
//! Every message crossing the boundary (persisted, broadcast, replayed) is the
//! JSON object `{"id", "author", "content", "created_at"}`.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

/// Canonical message bytes shared between every mailbox of a hub
///
/// Fan-out clones the `Arc`, not the bytes.
pub type Payload = Arc<[u8]>;

/// A chat message
///
/// `id` stays empty until the repository persists the message, and
/// `created_at` (unix seconds, UTC) is stamped once by the server.
///
/// Inbound frames are lenient: a missing or `null` field reads as its zero
/// value. Only a frame that is not a JSON object of this shape is malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Server-assigned identifier
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    /// Display name of the sender
    #[serde(deserialize_with = "null_as_default")]
    pub author: String,
    /// Message body
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    /// Unix timestamp in seconds (UTC)
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: i64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    /// Create an unpersisted message
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            author: author.into(),
            content: content.into(),
            created_at: 0,
        }
    }

    /// Parse an inbound frame
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Serialize into the canonical wire form
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_vec(self).map(Payload::from)
    }

    /// Whether the repository has assigned an id yet
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_without_server_fields() {
        let msg = Message::from_slice(br#"{"author":"alice","content":"hi"}"#).unwrap();
        assert_eq!(msg.author, "alice");
        assert_eq!(msg.content, "hi");
        assert!(msg.id.is_empty());
        assert_eq!(msg.created_at, 0);
        assert!(!msg.is_persisted());
    }

    #[test]
    fn test_inbound_missing_or_null_fields_are_zero() {
        let msg = Message::from_slice(br#"{"author":"alice"}"#).unwrap();
        assert_eq!(msg.author, "alice");
        assert_eq!(msg.content, "");

        let msg = Message::from_slice(
            br#"{"id":null,"author":null,"content":"hi","created_at":null}"#,
        )
        .unwrap();
        assert_eq!(msg, Message::new("", "hi"));

        assert_eq!(Message::from_slice(b"{}").unwrap(), Message::default());
    }

    #[test]
    fn test_inbound_wrong_shape_is_rejected() {
        assert!(Message::from_slice(b"hello").is_err());
        assert!(Message::from_slice(b"[1,2]").is_err());
        assert!(Message::from_slice(br#"{"author":7}"#).is_err());
        assert!(Message::from_slice(br#"{"created_at":"soon"}"#).is_err());
    }

    #[test]
    fn test_canonical_field_order() {
        let msg = Message {
            id: "m1".to_string(),
            author: "bob".to_string(),
            content: "yo".to_string(),
            created_at: 1_700_000_000,
        };
        let payload = msg.to_payload().unwrap();
        assert_eq!(
            std::str::from_utf8(&payload).unwrap(),
            r#"{"id":"m1","author":"bob","content":"yo","created_at":1700000000}"#
        );
    }
}
