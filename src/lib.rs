//! Room-scoped WebSocket Chat Server Library
//!
//! A community of isolated chat rooms ("hubs") built with tokio-tungstenite
//! using the Actor pattern for state management.
//!
//! # Features
//! - Any number of rooms, created on demand and joined by id
//! - Persisted messages, server-stamped and canonicalized as JSON
//! - History replay to late joiners, in timestamp order, before live traffic
//! - Bounded per-client mailboxes; slow clients are disconnected
//! - Origin allow-list per server
//!
//! # Architecture
//! - `Community` maps hub ids to running hubs
//! - Each `Hub` is an actor: one task owns the room's membership and
//!   serializes register / unregister / broadcast / terminate
//! - Each connection is a `Client` with a read pump and a write pump
//! - Persistence sits behind the `MessageRepository` trait
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use clap::Parser;
//! use tokio::net::TcpListener;
//! use community_chat::{serve, Community, InMemoryMessageRepository, MessageService, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::parse();
//!     let service = MessageService::new(Arc::new(InMemoryMessageRepository::new()));
//!     let community = Community::new(Arc::new(service), config.hub_config());
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     serve(listener, community, Arc::new(config)).await;
//! }
//! ```

pub mod client;
pub mod community;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod repository;
pub mod server;
pub mod service;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, ClientTasks, DisconnectSignal};
pub use community::Community;
pub use config::ServerConfig;
pub use error::{AppError, CommunityError, HubError, ProcessError, RepositoryError, TransportError};
pub use handler::{handle_connection, HUB_ID_HEADER, HUB_ID_PARAM};
pub use hub::{Hub, HubConfig, Mailbox};
pub use message::{Message, Payload};
pub use repository::{InMemoryMessageRepository, MessageRepository};
pub use server::serve;
pub use service::{Clock, MessageService, SystemClock};
pub use transport::{FrameReader, FrameWriter};
pub use types::{ClientId, HubId};
