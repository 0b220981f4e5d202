//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `HubId`: UUID-based identifier of a chat room
//! - `ClientId`: UUID-based identifier of a single connection

use std::str::FromStr;

use uuid::Uuid;

/// Unique hub (chat room) identifier
///
/// Opaque to callers; rendered and parsed as a hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HubId(pub Uuid);

impl HubId {
    /// Create a new random hub ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HubId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HubId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HubId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe client identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
