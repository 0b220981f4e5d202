//! Community: the registry of running hubs
//!
//! Maps hub ids to live hubs. Lookups and registration are synchronous so
//! they can run inside the WebSocket handshake callback; the lock is never
//! held across an await.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::CommunityError;
use crate::hub::{Hub, HubConfig};
use crate::service::MessageService;
use crate::types::HubId;

/// Registry of hubs sharing one message service
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone)]
pub struct Community {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    hubs: RwLock<HashMap<HubId, Hub>>,
    service: Arc<MessageService>,
    config: HubConfig,
}

impl Community {
    pub fn new(service: Arc<MessageService>, config: HubConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                hubs: RwLock::new(HashMap::new()),
                service,
                config,
            }),
        }
    }

    /// Create a hub, start its loop and record it
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register_hub(&self) -> Hub {
        let hub = Hub::spawn(self.inner.service.clone(), self.inner.config);
        self.inner
            .hubs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hub.id(), hub.clone());

        info!("Community created hub {}", hub.id());
        hub
    }

    /// Look up a live hub by its string id
    pub fn find_hub_by_id(&self, id: &str) -> Result<Hub, CommunityError> {
        let not_found = || CommunityError::HubNotFound(id.to_string());
        let hub_id: HubId = id.parse().map_err(|_| not_found())?;

        self.inner
            .hubs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&hub_id)
            .cloned()
            .ok_or_else(not_found)
    }

    /// Remove a hub and terminate it, disconnecting all of its clients
    pub async fn unregister_hub(&self, id: &str) -> Result<(), CommunityError> {
        let not_found = || CommunityError::HubNotFound(id.to_string());
        let hub_id: HubId = id.parse().map_err(|_| not_found())?;

        let hub = self
            .inner
            .hubs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&hub_id)
            .ok_or_else(not_found)?;

        if hub.terminate().await.is_err() {
            debug!("Hub {} had already stopped", hub_id);
        }
        info!("Community removed hub {}", hub_id);
        Ok(())
    }

    pub fn hub_count(&self) -> usize {
        self.inner
            .hubs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn hub_ids(&self) -> Vec<HubId> {
        self.inner
            .hubs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}
