//! Hub actor implementation
//!
//! A hub is one chat room. Its control loop is the only owner of the room's
//! membership and processes register, unregister, broadcast and terminate
//! commands one at a time, so every member sees the same total order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::DisconnectSignal;
use crate::error::HubError;
use crate::message::Payload;
use crate::service::MessageService;
use crate::types::{ClientId, HubId};

/// Default per-client live mailbox capacity
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Default hub command channel capacity
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Receiving end of a client's outbound queue
pub type Mailbox = mpsc::Receiver<Payload>;

/// Sizing for hub channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Live messages a client may lag behind before it is disconnected
    pub mailbox_capacity: usize,
    /// Pending commands before senders wait on the hub
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

/// Commands sent from clients and the community to a hub loop
#[derive(Debug)]
pub(crate) enum HubCommand {
    /// Join the room; the reply carries the mailbox, pre-filled with history
    Register {
        client_id: ClientId,
        disconnect: DisconnectSignal,
        reply: oneshot::Sender<Mailbox>,
    },
    /// Leave the room (no-op when not a member)
    Unregister { client_id: ClientId },
    /// Raw inbound frame to canonicalize and fan out
    Broadcast { from: ClientId, frame: Vec<u8> },
    /// Report the current number of members
    MemberCount { reply: oneshot::Sender<usize> },
    /// Disconnect every member and stop the loop
    Terminate,
}

/// Handle to a running hub
///
/// Cheap to clone; every clone talks to the same control loop.
#[derive(Debug, Clone)]
pub struct Hub {
    id: HubId,
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Create a hub with a fresh id and start its loop on the runtime
    pub fn spawn(service: Arc<MessageService>, config: HubConfig) -> Self {
        let id = HubId::new();
        let (commands, receiver) = mpsc::channel(config.command_buffer.max(1));
        let hub_loop = HubLoop::new(id, receiver, service, config.mailbox_capacity.max(1));
        tokio::spawn(hub_loop.run());
        Self { id, commands }
    }

    pub fn id(&self) -> HubId {
        self.id
    }

    /// Whether the hub's loop has stopped
    pub fn is_terminated(&self) -> bool {
        self.commands.is_closed()
    }

    /// Join the room
    ///
    /// Completes once the loop has accepted the client and queued the room's
    /// history into the returned mailbox. Live broadcasts follow the history.
    pub async fn register(
        &self,
        client_id: ClientId,
        disconnect: DisconnectSignal,
    ) -> Result<Mailbox, HubError> {
        let (reply, mailbox) = oneshot::channel();
        self.send(HubCommand::Register {
            client_id,
            disconnect,
            reply,
        })
        .await?;
        mailbox.await.map_err(|_| HubError::Terminated)
    }

    pub async fn unregister(&self, client_id: ClientId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister { client_id }).await
    }

    /// Queue a raw frame for canonicalization and fan-out
    pub async fn broadcast(&self, from: ClientId, frame: Vec<u8>) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast { from, frame }).await
    }

    pub async fn member_count(&self) -> Result<usize, HubError> {
        let (reply, count) = oneshot::channel();
        self.send(HubCommand::MemberCount { reply }).await?;
        count.await.map_err(|_| HubError::Terminated)
    }

    /// Ask the loop to disconnect every member and stop
    ///
    /// Commands queued before this one are still processed.
    pub async fn terminate(&self) -> Result<(), HubError> {
        self.send(HubCommand::Terminate).await
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), HubError> {
        self.commands.send(cmd).await.map_err(|_| HubError::Terminated)
    }
}

/// A registered client as seen by the hub
struct Member {
    mailbox: mpsc::Sender<Payload>,
    disconnect: DisconnectSignal,
}

/// The hub control loop
///
/// Owns the membership map; nothing else mutates it.
struct HubLoop {
    id: HubId,
    clients: HashMap<ClientId, Member>,
    receiver: mpsc::Receiver<HubCommand>,
    service: Arc<MessageService>,
    mailbox_capacity: usize,
}

impl HubLoop {
    fn new(
        id: HubId,
        receiver: mpsc::Receiver<HubCommand>,
        service: Arc<MessageService>,
        mailbox_capacity: usize,
    ) -> Self {
        Self {
            id,
            clients: HashMap::new(),
            receiver,
            service,
            mailbox_capacity,
        }
    }

    /// Run until terminated or until every handle is dropped
    async fn run(mut self) {
        info!("Hub {} started", self.id);

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                HubCommand::Register {
                    client_id,
                    disconnect,
                    reply,
                } => {
                    self.handle_register(client_id, disconnect, reply).await;
                }
                HubCommand::Unregister { client_id } => {
                    self.handle_unregister(client_id);
                }
                HubCommand::Broadcast { from, frame } => {
                    self.handle_broadcast(from, frame).await;
                }
                HubCommand::MemberCount { reply } => {
                    let _ = reply.send(self.clients.len());
                }
                HubCommand::Terminate => {
                    self.handle_terminate();
                    break;
                }
            }
        }

        info!("Hub {} stopped", self.id);
    }

    async fn handle_register(
        &mut self,
        client_id: ClientId,
        disconnect: DisconnectSignal,
        reply: oneshot::Sender<Mailbox>,
    ) {
        let history = self.service.get_message_collection(&self.id).await;
        let replayed = history.len();

        // Room for the whole history plus the live allowance, so replay never waits.
        let (mailbox, receiver) = mpsc::channel(replayed + self.mailbox_capacity);
        for payload in history {
            if mailbox.try_send(payload).is_err() {
                warn!("Hub {} could not replay history to {}", self.id, client_id);
                break;
            }
        }

        if reply.send(receiver).is_err() {
            debug!("Client {} left before registration completed", client_id);
            return;
        }

        self.clients.insert(
            client_id,
            Member {
                mailbox,
                disconnect,
            },
        );
        info!(
            "Client {} joined hub {} ({} replayed, {} members)",
            client_id,
            self.id,
            replayed,
            self.clients.len()
        );
    }

    fn handle_unregister(&mut self, client_id: ClientId) {
        if self.clients.remove(&client_id).is_some() {
            info!(
                "Client {} left hub {} ({} members)",
                client_id,
                self.id,
                self.clients.len()
            );
        }
    }

    async fn handle_broadcast(&mut self, from: ClientId, frame: Vec<u8>) {
        let payload = match self.service.process(&self.id, &frame).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Hub {} dropped message from {}: {}", self.id, from, e);
                return;
            }
        };

        let mut evicted = Vec::new();
        for (client_id, member) in &self.clients {
            match member.mailbox.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Hub {} disconnecting slow client {}", self.id, client_id);
                    evicted.push(*client_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Hub {} found closed mailbox for {}", self.id, client_id);
                    evicted.push(*client_id);
                }
            }
        }

        for client_id in evicted {
            if let Some(member) = self.clients.remove(&client_id) {
                member.disconnect.fire();
            }
        }
    }

    /// Disconnect everyone; dropping the senders closes every mailbox
    fn handle_terminate(&mut self) {
        let count = self.clients.len();
        for (_, member) in self.clients.drain() {
            member.disconnect.fire();
        }
        info!("Hub {} terminating, disconnected {} clients", self.id, count);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;
    use crate::message::Message;
    use crate::repository::InMemoryMessageRepository;
    use crate::service::Clock;

    /// Advances one second per reading
    struct SteppingClock(AtomicI64);

    impl Clock for SteppingClock {
        fn now_unix(&self) -> i64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    fn service() -> Arc<MessageService> {
        Arc::new(MessageService::with_clock(
            Arc::new(InMemoryMessageRepository::new()),
            Arc::new(SteppingClock(AtomicI64::new(1_000))),
        ))
    }

    fn spawn_hub(service: &Arc<MessageService>) -> Hub {
        Hub::spawn(service.clone(), HubConfig::default())
    }

    fn frame(author: &str, content: &str) -> Vec<u8> {
        serde_json::to_vec(&Message::new(author, content)).unwrap()
    }

    async fn join(hub: &Hub) -> (ClientId, Mailbox, DisconnectSignal) {
        let client_id = ClientId::new();
        let disconnect = DisconnectSignal::new();
        let mailbox = hub.register(client_id, disconnect.clone()).await.unwrap();
        (client_id, mailbox, disconnect)
    }

    fn drain(mailbox: &mut Mailbox) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(payload) = mailbox.try_recv() {
            out.push(serde_json::from_slice(&payload).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_member() {
        let service = service();
        let hub = spawn_hub(&service);
        let (alice, mut alice_box, _) = join(&hub).await;
        let (_, mut bob_box, _) = join(&hub).await;

        hub.broadcast(alice, br#"{"author":"alice","content":"hi"}"#.to_vec())
            .await
            .unwrap();
        hub.member_count().await.unwrap();

        let at_alice = drain(&mut alice_box);
        let at_bob = drain(&mut bob_box);
        assert_eq!(at_alice.len(), 1);
        assert_eq!(at_alice, at_bob);
        assert!(!at_alice[0].id.is_empty());
        assert_eq!(at_alice[0].author, "alice");
        assert_eq!(at_alice[0].content, "hi");
    }

    #[tokio::test]
    async fn test_broadcast_order_is_shared_by_all_members() {
        let service = service();
        let hub = spawn_hub(&service);
        let mut boxes = Vec::new();
        for _ in 0..3 {
            let (_, mailbox, _) = join(&hub).await;
            boxes.push(mailbox);
        }

        let sender = ClientId::new();
        for i in 0..20 {
            hub.broadcast(sender, frame("alice", &i.to_string()))
                .await
                .unwrap();
        }
        hub.member_count().await.unwrap();

        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        for mailbox in &mut boxes {
            let contents: Vec<String> = drain(mailbox).into_iter().map(|m| m.content).collect();
            assert_eq!(contents, expected);
        }
    }

    #[tokio::test]
    async fn test_late_joiner_gets_history_before_live() {
        let service = service();
        let hub = spawn_hub(&service);
        let sender = ClientId::new();
        for content in ["one", "two", "three"] {
            hub.broadcast(sender, frame("alice", content)).await.unwrap();
        }

        let (_, mut mailbox, _) = join(&hub).await;
        hub.broadcast(sender, frame("alice", "four")).await.unwrap();
        hub.member_count().await.unwrap();

        let received = drain(&mut mailbox);
        let contents: Vec<&str> = received.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three", "four"]);
        assert!(received.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_hubs_are_isolated() {
        let service = service();
        let hub_a = spawn_hub(&service);
        let hub_b = spawn_hub(&service);
        let (_, mut a_box, _) = join(&hub_a).await;
        let (_, mut b_box, _) = join(&hub_b).await;

        hub_a
            .broadcast(ClientId::new(), frame("alice", "for a"))
            .await
            .unwrap();
        hub_a.member_count().await.unwrap();
        hub_b.member_count().await.unwrap();

        assert_eq!(drain(&mut a_box).len(), 1);
        assert!(drain(&mut b_box).is_empty());

        let (_, mut late_b, _) = join(&hub_b).await;
        assert!(drain(&mut late_b).is_empty());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent_and_stops_delivery() {
        let service = service();
        let hub = spawn_hub(&service);
        let (alice, mut alice_box, _) = join(&hub).await;
        let (_, mut bob_box, _) = join(&hub).await;

        hub.unregister(alice).await.unwrap();
        hub.unregister(alice).await.unwrap();
        hub.broadcast(ClientId::new(), frame("bob", "after"))
            .await
            .unwrap();
        assert_eq!(hub.member_count().await.unwrap(), 1);

        // Sender dropped on removal, so the mailbox is closed and empty.
        assert!(alice_box.recv().await.is_none());
        assert_eq!(drain(&mut bob_box).len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let service = service();
        let hub = spawn_hub(&service);
        let (sender, mut mailbox, _) = join(&hub).await;

        hub.broadcast(sender, b"not json".to_vec()).await.unwrap();
        hub.broadcast(sender, frame("alice", "valid")).await.unwrap();
        hub.member_count().await.unwrap();

        let received = drain(&mut mailbox);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "valid");
    }

    #[tokio::test]
    async fn test_slow_client_is_disconnected() {
        let service = service();
        let hub = Hub::spawn(
            service,
            HubConfig {
                mailbox_capacity: 1,
                command_buffer: 8,
            },
        );
        let (slow, mut slow_box, slow_signal) = join(&hub).await;

        hub.broadcast(slow, frame("a", "1")).await.unwrap();
        hub.broadcast(slow, frame("a", "2")).await.unwrap();
        assert_eq!(hub.member_count().await.unwrap(), 0);

        assert!(slow_signal.is_fired());
        assert_eq!(slow_box.recv().await.map(|p| !p.is_empty()), Some(true));
        assert!(slow_box.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_terminate_disconnects_members_and_stops() {
        let service = service();
        let hub = spawn_hub(&service);
        let (_, mut alice_box, alice_signal) = join(&hub).await;
        let (_, mut bob_box, bob_signal) = join(&hub).await;

        hub.terminate().await.unwrap();

        assert!(alice_box.recv().await.is_none());
        assert!(bob_box.recv().await.is_none());
        assert!(alice_signal.is_fired());
        assert!(bob_signal.is_fired());

        let late = hub.register(ClientId::new(), DisconnectSignal::new()).await;
        assert_eq!(late.unwrap_err(), HubError::Terminated);
        assert!(hub.is_terminated());
    }
}
