//! TCP accept loop
//!
//! Accepts connections and hands each one to its own handler task.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::community::Community;
use crate::config::ServerConfig;
use crate::handler::handle_connection;

/// Accept connections forever
///
/// A failed accept or a failed connection is logged and never stops the loop.
pub async fn serve(listener: TcpListener, community: Community, config: Arc<ServerConfig>) {
    if let Ok(addr) = listener.local_addr() {
        info!("WebSocket Chat Server listening on {}", addr);
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from {}", addr);
                let community = community.clone();
                let config = config.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, community, config).await {
                        error!("Connection handler error for {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
