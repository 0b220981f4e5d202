//! Error types for the chat server
//!
//! One enum per concern (registry, hub, message processing, persistence,
//! transport) plus the connection-level `AppError`.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::message::Message;

/// Connection-level errors
///
/// Returned by the connection handler; all of them end that one connection
/// and nothing else.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error during the upgrade
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested hub does not exist
    #[error(transparent)]
    Community(#[from] CommunityError),

    /// The hub went away while attaching
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Registry errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommunityError {
    /// No live hub with the given id
    #[error("Hub not found: {0}")]
    HubNotFound(String),
}

/// Errors talking to a hub's control loop
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The hub's loop has stopped; its command channel is closed
    #[error("Hub terminated")]
    Terminated,
}

/// Why an inbound frame did not become a canonical message
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The frame is not a valid message object
    #[error("Malformed message: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// The repository rejected the write
    #[error("Failed to persist message: {0}")]
    Persistence(#[from] RepositoryError),

    /// The persisted message could not be encoded
    #[error("Failed to encode message: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// Persistence errors reported by a `MessageRepository`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The store could not be reached or refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A collection read failed part-way; `recovered` holds what was read
    #[error("Partial read ({count} recovered): {reason}", count = .recovered.len())]
    Partial {
        recovered: Vec<Message>,
        reason: String,
    },
}

/// Connection-level transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection (orderly or not)
    #[error("Connection closed")]
    Closed,

    /// WebSocket protocol or IO failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A text frame must carry UTF-8
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}
