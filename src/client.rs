//! Client connection adapter
//!
//! Bridges one transport to its hub with two tasks:
//! - the read pump forwards every inbound frame to the hub as a broadcast
//! - the write pump drains the client's mailbox into the transport,
//!   batching whatever is already queued into a single frame
//!
//! Either pump (or the hub) can end the connection; termination runs once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{HubError, TransportError};
use crate::hub::{Hub, Mailbox};
use crate::transport::{FrameReader, FrameWriter};
use crate::types::ClientId;

/// Separator between payloads coalesced into one frame
const BATCH_SEPARATOR: u8 = b'\n';

/// Tells a client's pumps to stop
///
/// Shared between the hub (which fires it on terminate or eviction) and the
/// client's own pumps. Once fired it stays fired.
#[derive(Debug, Clone)]
pub struct DisconnectSignal(Arc<watch::Sender<bool>>);

impl DisconnectSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    pub fn fire(&self) {
        self.0.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once the signal has fired (immediately if it already has)
    pub async fn fired(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for DisconnectSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by both pumps of one client
struct Session {
    id: ClientId,
    hub: Hub,
    disconnect: DisconnectSignal,
    terminated: AtomicBool,
}

impl Session {
    /// Leave the hub and stop both pumps; only the first call does anything
    async fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = self.hub.unregister(self.id).await {
            debug!("Client {} skipped unregister: {}", self.id, e);
        }
        self.disconnect.fire();

        info!("Client {} disconnected from hub {}", self.id, self.hub.id());
    }
}

/// A connection registered with a hub, ready to run its pumps
pub struct Client<R, W> {
    session: Arc<Session>,
    reader: R,
    writer: W,
    mailbox: Mailbox,
}

impl<R, W> Client<R, W>
where
    R: FrameReader + 'static,
    W: FrameWriter + 'static,
{
    /// Attach a transport to `hub`
    ///
    /// Waits until the hub loop has accepted the client; by then the room's
    /// history is already queued in the mailbox.
    pub async fn register(hub: Hub, reader: R, writer: W) -> Result<Self, HubError> {
        let id = ClientId::new();
        let disconnect = DisconnectSignal::new();
        let mailbox = hub.register(id, disconnect.clone()).await?;

        debug!("Client {} registered with hub {}", id, hub.id());

        Ok(Self {
            session: Arc::new(Session {
                id,
                hub,
                disconnect,
                terminated: AtomicBool::new(false),
            }),
            reader,
            writer,
            mailbox,
        })
    }

    pub fn id(&self) -> ClientId {
        self.session.id
    }

    /// Start the read and write pumps
    pub fn spawn(self) -> ClientTasks {
        let Self {
            session,
            reader,
            writer,
            mailbox,
        } = self;

        let read = tokio::spawn(read_pump(session.clone(), reader));
        let write = tokio::spawn(write_pump(session.clone(), mailbox, writer));

        ClientTasks {
            session,
            read,
            write,
        }
    }
}

/// Handles to a running client's pumps
pub struct ClientTasks {
    session: Arc<Session>,
    read: JoinHandle<()>,
    write: JoinHandle<()>,
}

impl ClientTasks {
    pub fn id(&self) -> ClientId {
        self.session.id
    }

    /// Disconnect this client; safe to call any number of times
    pub async fn terminate(&self) {
        self.session.terminate().await;
    }

    /// Wait for both pumps to finish
    pub async fn join(self) {
        let id = self.session.id;
        let (read, write) = tokio::join!(self.read, self.write);
        if let Err(e) = read {
            error!("Client {} read pump panicked: {}", id, e);
        }
        if let Err(e) = write {
            error!("Client {} write pump panicked: {}", id, e);
        }
    }
}

/// Transport -> hub
async fn read_pump<R: FrameReader>(session: Arc<Session>, mut reader: R) {
    let id = session.id;

    loop {
        let frame = tokio::select! {
            biased;
            _ = session.disconnect.fired() => {
                debug!("Client {} read pump stopping on disconnect", id);
                break;
            }
            frame = reader.receive_frame() => frame,
        };

        match frame {
            Ok(frame) => {
                if session.hub.broadcast(id, frame).await.is_err() {
                    debug!("Client {} hub is gone", id);
                    break;
                }
            }
            Err(TransportError::Closed) => {
                debug!("Client {} closed the connection", id);
                break;
            }
            Err(e) => {
                warn!("Client {} read failed: {}", id, e);
                break;
            }
        }
    }

    session.terminate().await;
}

/// Mailbox -> transport
async fn write_pump<W: FrameWriter>(session: Arc<Session>, mut mailbox: Mailbox, mut writer: W) {
    let id = session.id;

    loop {
        let Some(first) = mailbox.recv().await else {
            debug!("Client {} mailbox closed", id);
            if let Err(e) = writer.write_close_frame().await {
                debug!("Client {} close frame not sent: {}", id, e);
            }
            break;
        };

        // Coalesce what is already queued; never wait for more.
        let mut batch = first.to_vec();
        while let Ok(next) = mailbox.try_recv() {
            batch.push(BATCH_SEPARATOR);
            batch.extend_from_slice(&next);
        }

        if let Err(e) = writer.write_text_frame(batch).await {
            warn!("Client {} write failed: {}", id, e);
            break;
        }
    }

    if let Err(e) = writer.close().await {
        debug!("Client {} transport close failed: {}", id, e);
    }
    session.disconnect.fire();
}
