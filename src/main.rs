//! Community Chat Server - Entry Point
//!
//! Builds the message store, the community of hubs and the TCP listener,
//! then accepts connections.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use community_chat::{serve, Community, InMemoryMessageRepository, MessageService, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=community_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("community_chat=info")),
        )
        .init();

    let config = ServerConfig::parse();

    let repository = Arc::new(InMemoryMessageRepository::new());
    let service = Arc::new(MessageService::new(repository));
    let community = Community::new(service, config.hub_config());

    let listener = TcpListener::bind(&config.addr).await?;
    info!(
        "Mailbox capacity {}, hub buffer {}",
        config.mailbox_capacity, config.hub_buffer
    );

    serve(listener, community, Arc::new(config)).await;
    Ok(())
}
