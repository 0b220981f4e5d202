//! WebSocket connection handler
//!
//! Handles individual client connections: origin check and hub routing
//! during the handshake, then attaches a `Client` to the chosen hub and
//! waits for its pumps to finish.
//!
//! Routing:
//! - `?hub_id=<id>` joins an existing hub (404 when unknown)
//! - no `hub_id` creates a new hub
//!
//! The handshake response names the hub in the `x-hub-id` header so the
//! peer can invite others to the same room.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::community::Community;
use crate::config::ServerConfig;
use crate::error::{AppError, CommunityError};
use crate::hub::Hub;
use crate::transport;

/// Response header carrying the joined hub's id
pub const HUB_ID_HEADER: &str = "x-hub-id";

/// Query parameter selecting an existing hub
pub const HUB_ID_PARAM: &str = "hub_id";

/// Hub chosen during the handshake
struct Route {
    hub: Hub,
    /// The hub was registered for this connection
    created: bool,
}

impl Route {
    /// Undo a hub registered for a connection that never attached
    async fn abandon(self, community: &Community) {
        if !self.created {
            return;
        }
        let hub_id = self.hub.id().to_string();
        debug!("Dropping unused hub {}", hub_id);
        if let Err(e) = community.unregister_hub(&hub_id).await {
            debug!("Hub {} already gone: {}", hub_id, e);
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, attaches the connection to its hub
/// and returns once the client has disconnected.
pub async fn handle_connection(
    stream: TcpStream,
    community: Community,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    let mut route: Option<Route> = None;
    let handshake = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
            let origin = req
                .headers()
                .get(header::ORIGIN)
                .and_then(|v| v.to_str().ok());
            if !config.origin_allowed(origin) {
                warn!("Rejected {} from origin {:?}", peer_addr, origin);
                return Err(reject(StatusCode::FORBIDDEN, "origin not allowed"));
            }

            let resolved = resolve_hub(&community, req.uri().query()).map_err(|e| {
                warn!("Rejected {}: {}", peer_addr, e);
                reject(StatusCode::NOT_FOUND, &e.to_string())
            })?;

            if let Ok(value) = HeaderValue::from_str(&resolved.hub.id().to_string()) {
                resp.headers_mut().insert(HUB_ID_HEADER, value);
            }
            route = Some(resolved);
            Ok(resp)
        },
    )
    .await;

    attach(&community, route, handshake, &peer_addr).await
}

/// Attach an upgraded connection to its hub and run it to completion
///
/// A hub created during the handshake is unregistered again when the
/// upgrade or the registration fails, so no empty hub is left behind.
async fn attach<S>(
    community: &Community,
    route: Option<Route>,
    handshake: Result<WebSocketStream<S>, WsError>,
    peer_addr: &str,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = match handshake {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            if let Some(route) = route {
                route.abandon(community).await;
            }
            return Err(e.into());
        }
    };

    let route = route.ok_or_else(|| CommunityError::HubNotFound("<unresolved>".to_string()))?;
    let hub_id = route.hub.id();

    let (reader, writer) = transport::split(ws_stream);
    let client = match Client::register(route.hub.clone(), reader, writer).await {
        Ok(client) => client,
        Err(e) => {
            route.abandon(community).await;
            return Err(e.into());
        }
    };
    let client_id = client.id();
    info!(
        "Client {} connected from {} to hub {}",
        client_id, peer_addr, hub_id
    );

    client.spawn().join().await;

    info!("Client {} left hub {}", client_id, hub_id);
    Ok(())
}

/// Pick the hub a handshake asks for, creating one when none is named
fn resolve_hub(community: &Community, query: Option<&str>) -> Result<Route, CommunityError> {
    match query_param(query, HUB_ID_PARAM) {
        Some(id) if !id.is_empty() => Ok(Route {
            hub: community.find_hub_by_id(id)?,
            created: false,
        }),
        _ => Ok(Route {
            hub: community.register_hub(),
            created: true,
        }),
    }
}

/// Value of `key` in a raw query string (no percent-decoding; ids are plain)
fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let mut it = pair.splitn(2, '=');
        match (it.next(), it.next()) {
            (Some(k), value) if k == key => Some(value.unwrap_or("")),
            _ => None,
        }
    })
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
