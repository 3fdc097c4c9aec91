//! Server state management
//!
//! Top-level assembly: owns the event bus, the connection registry, both
//! directories, the router and the spam guard, and drives the heartbeat.
//! Handlers talk to this type only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use warp::ws::Message;

use crate::config::ServerConfig;
use crate::core::directory::RoomDirectory;
use crate::core::events::EventBus;
use crate::core::message::{NetworkEvent, Outbound};
use crate::core::network::NetworkDirectory;
use crate::core::rate_limiter::SpamGuard;
use crate::core::registry::{ClientMeta, ConnectionRegistry, ConnectionTicket};
use crate::core::router::MessageRouter;

pub type SharedServerManager = Arc<ServerManager>;

pub struct ServerManager {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomDirectory>,
    networks: Arc<NetworkDirectory>,
    router: MessageRouter,
    spam_guard: SpamGuard,
    heartbeat_interval: Duration,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ServerManager {
    pub fn new(config: &ServerConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(ConnectionRegistry::new(bus.clone()));
        let rooms = Arc::new(RoomDirectory::new(bus.clone()));
        let networks = Arc::new(NetworkDirectory::new());
        let router = MessageRouter::new(
            bus,
            rooms.clone(),
            networks.clone(),
            registry.clone(),
        );

        Self {
            registry,
            rooms,
            networks,
            router,
            spam_guard: SpamGuard::from_config(config),
            heartbeat_interval: config.heartbeat_interval,
            heartbeat: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// The host directory, exposed for the read-only HTTP listing.
    pub fn networks(&self) -> &NetworkDirectory {
        &self.networks
    }

    pub fn client_count(&self) -> usize {
        self.registry.client_count()
    }

    /// Register a new transport; the welcome frame carries the current room
    /// directory snapshot.
    pub fn connect(
        &self,
        sender: mpsc::UnboundedSender<Message>,
        meta: &ClientMeta,
    ) -> ConnectionTicket {
        let ticket = self.registry.welcome(sender, meta, self.rooms.summaries());
        debug!("client connected: {}", ticket.id);
        ticket
    }

    /// Process one inbound text frame. Returns true when the sender tripped
    /// the spam guard and the caller must close the transport; no message is
    /// sent to the abuser.
    pub fn handle_message(&self, id: &str, text: &str) -> bool {
        match self.registry.spam_check(&self.spam_guard, id) {
            Some(true) => {
                warn!("client {} exceeded spam strikes, closing", id);
                true
            }
            Some(false) => {
                self.router.route(id, text);
                false
            }
            // frame from a connection already reaped; nothing to do
            None => false,
        }
    }

    pub fn pong(&self, id: &str) {
        self.registry.pong(id);
    }

    /// Tear down one connection and cascade: leave every room it was a
    /// member of, drop its network registration and broadcast the deletion.
    /// Idempotent, and a stale ticket (superseded registration) is a no-op.
    pub fn disconnect(&self, ticket: &ConnectionTicket) {
        let Some(conn) = self.registry.take(ticket) else {
            return;
        };

        for room_id in &conn.rooms {
            if let Some(room) = self.rooms.get(room_id) {
                room.lock().unwrap_or_else(|e| e.into_inner()).leave(&conn.id);
            }
        }

        // hosts only hear about their own network; the deletion goes to the
        // non-host peers browsing the directory
        if let Some(network) = self.networks.remove(&conn.id) {
            self.registry.broadcast(
                &Outbound::Network(NetworkEvent::Deleted { network }),
                |c| !self.networks.is_host(&c.id),
            );
        }

        debug!("client disconnected: {}", conn.id);
    }

    /// Spawn the heartbeat task: every interval, sweep the registry and run
    /// the full disconnect cascade for reaped connections.
    pub fn start_heartbeat(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let interval = self.heartbeat_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for ticket in manager.registry.sweep() {
                    debug!("heartbeat reaped {}", ticket.id);
                    manager.disconnect(&ticket);
                }
            }
        });

        let mut slot = self.heartbeat.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Shut the server state down once: stop the heartbeat, close every
    /// connection and detach the directory listeners.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down server state");

        let handle = self
            .heartbeat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }

        self.registry.close();
        self.rooms.close();
    }
}
