//! Connection registry
//!
//! Owns the id→connection map, assigns identities at welcome time, consumes
//! send intents off the event bus, and runs the heartbeat liveness
//! protocol. All methods are synchronous in-memory operations; the only
//! I/O is pushing frames onto per-connection channels.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, warn};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use warp::ws::Message;

use crate::core::connection::Connection;
use crate::core::events::{
    BusEvent, EventBus, ListenerId, SendIntent, EVENT_ROOM_REMOVE, EVENT_SEND,
};
use crate::core::message::{Outbound, RoomInfo, SocketEvent, SocketId};
use crate::core::rate_limiter::SpamGuard;

/// Request metadata captured at upgrade time, fed to the id strategy.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
    pub remote_addr: Option<SocketAddr>,
}

/// Pluggable id assignment; the default derives the id from the client's
/// user agent and remote address.
pub type IdStrategy = Box<dyn Fn(&ClientMeta) -> SocketId + Send + Sync>;

/// Proof of one particular registration. The epoch distinguishes a
/// connection from a later one welcomed under the same id, so a superseded
/// socket's cleanup cannot tear down its replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTicket {
    pub id: SocketId,
    pub epoch: u64,
}

struct RegistryInner {
    connections: Mutex<HashMap<SocketId, Connection>>,
    closed: AtomicBool,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<SocketId, Connection>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliver(&self, intent: &SendIntent) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let text = match serde_json::to_string(&intent.message) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize outbound message: {}", e);
                return;
            }
        };

        let connections = self.lock();
        for id in &intent.sockets {
            if let Some(conn) = connections.get(id) {
                conn.send_text(&text);
            }
        }
    }

    fn forget_room(&self, room_id: &str) {
        for conn in self.lock().values_mut() {
            conn.rooms.retain(|r| r != room_id);
        }
    }
}

pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
    bus: Arc<EventBus>,
    send_listener: Option<ListenerId>,
    remove_listener: Option<ListenerId>,
    id_strategy: IdStrategy,
    next_epoch: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_id_strategy(bus, Box::new(default_id))
    }

    pub fn with_id_strategy(bus: Arc<EventBus>, id_strategy: IdStrategy) -> Self {
        if !bus.has(EVENT_SEND) {
            bus.register(EVENT_SEND);
        }
        if !bus.has(EVENT_ROOM_REMOVE) {
            bus.register(EVENT_ROOM_REMOVE);
        }

        let inner = Arc::new(RegistryInner {
            connections: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let send_listener = {
            let inner = inner.clone();
            bus.add_listener(EVENT_SEND, move |event| {
                if let BusEvent::Send(intent) = event {
                    inner.deliver(intent);
                }
            })
        };

        // a deleted room disappears from every connection's membership list
        let remove_listener = {
            let inner = inner.clone();
            bus.add_listener(EVENT_ROOM_REMOVE, move |event| {
                if let BusEvent::RoomRemoved(id) = event {
                    inner.forget_room(id);
                }
            })
        };

        Self {
            inner,
            bus,
            send_listener,
            remove_listener,
            id_strategy,
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Register a new transport and send it the directory snapshot.
    ///
    /// A colliding id replaces the previous entry; unlike the transport
    /// being superseded silently, the old socket is sent a close frame so
    /// it cannot linger as an orphan.
    pub fn welcome(
        &self,
        sender: mpsc::UnboundedSender<Message>,
        meta: &ClientMeta,
        rooms: Vec<RoomInfo>,
    ) -> ConnectionTicket {
        let id = (self.id_strategy)(meta);
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let mut conn = Connection::new(id.clone(), epoch, sender, client_info(meta));

        {
            let mut connections = self.inner.lock();
            if let Some(prev) = connections.remove(&id) {
                warn!("duplicate connection id {}, closing superseded socket", id);
                // room memberships belong to the id, which now resolves to
                // this socket; dropping them would leave ghost members behind
                conn.rooms = prev.rooms.clone();
                prev.send_frame(Message::close());
            }
            connections.insert(id.clone(), conn);
        }

        self.bus.send(
            vec![id.clone()],
            Outbound::socket(SocketEvent::Welcome {
                id: id.clone(),
                rooms,
            }),
        );

        ConnectionTicket { id, epoch }
    }

    /// Heartbeat sweep. Connections that never answered the previous probe
    /// are sent a close frame and returned for cascade cleanup; the rest
    /// are marked suspect and pinged. Dead peers are therefore detected
    /// within two sweep intervals.
    pub fn sweep(&self) -> Vec<ConnectionTicket> {
        let mut reaped = Vec::new();
        let mut connections = self.inner.lock();
        for conn in connections.values_mut() {
            if !conn.is_alive {
                conn.send_frame(Message::close());
                reaped.push(ConnectionTicket {
                    id: conn.id.clone(),
                    epoch: conn.epoch,
                });
            } else {
                conn.is_alive = false;
                conn.send_frame(Message::ping(Vec::new()));
            }
        }
        reaped
    }

    pub fn pong(&self, id: &str) {
        if let Some(conn) = self.inner.lock().get_mut(id) {
            conn.is_alive = true;
        }
    }

    /// Run the spam guard against a connection's message timestamps.
    /// Returns None for unknown connections.
    pub fn spam_check(&self, guard: &SpamGuard, id: &str) -> Option<bool> {
        self.inner.lock().get_mut(id).map(|conn| guard.check(conn))
    }

    /// Remove and return the connection, but only if the epoch still
    /// matches; a replacement registered under the same id is left alone.
    pub fn take(&self, ticket: &ConnectionTicket) -> Option<Connection> {
        let mut connections = self.inner.lock();
        match connections.get(&ticket.id) {
            Some(conn) if conn.epoch == ticket.epoch => connections.remove(&ticket.id),
            _ => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().contains_key(id)
    }

    pub fn client_count(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn info_of(&self, id: &str) -> Value {
        self.inner
            .lock()
            .get(id)
            .map(|conn| conn.info.clone())
            .unwrap_or(Value::Null)
    }

    pub fn rooms_of(&self, id: &str) -> Vec<String> {
        self.inner
            .lock()
            .get(id)
            .map(|conn| conn.rooms.clone())
            .unwrap_or_default()
    }

    pub fn track_room(&self, id: &str, room_id: &str) {
        if let Some(conn) = self.inner.lock().get_mut(id) {
            if !conn.rooms.iter().any(|r| r == room_id) {
                conn.rooms.push(room_id.to_string());
            }
        }
    }

    pub fn untrack_room(&self, id: &str, room_id: &str) {
        if let Some(conn) = self.inner.lock().get_mut(id) {
            conn.rooms.retain(|r| r != room_id);
        }
    }

    /// Send to every connection passing the predicate; returns the number
    /// of successful sends.
    pub fn broadcast(&self, message: &Outbound, filter: impl Fn(&Connection) -> bool) -> usize {
        if self.inner.closed.load(Ordering::Relaxed) {
            return 0;
        }
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize broadcast message: {}", e);
                return 0;
            }
        };

        let connections = self.inner.lock();
        connections
            .values()
            .filter(|conn| filter(conn))
            .filter(|conn| conn.send_text(&text))
            .count()
    }

    /// Terminate every connection and detach from the bus. Safe to call
    /// once; subsequent sends become no-ops.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing connection registry");

        let mut connections = self.inner.lock();
        for conn in connections.values() {
            conn.send_frame(Message::close());
        }
        connections.clear();
        drop(connections);

        if let Some(id) = self.send_listener {
            self.bus.remove_listener(EVENT_SEND, id);
        }
        if let Some(id) = self.remove_listener {
            self.bus.remove_listener(EVENT_ROOM_REMOVE, id);
        }
    }
}

fn default_id(meta: &ClientMeta) -> SocketId {
    let agent = meta.user_agent.as_deref().unwrap_or("unknown");
    match meta.remote_addr {
        Some(addr) => format!("{} {}", agent, addr.ip()),
        None => format!("{} unknown", agent),
    }
}

fn client_info(meta: &ClientMeta) -> Value {
    json!({
        "userAgent": meta.user_agent,
        "address": meta.remote_addr.map(|addr| addr.ip().to_string()),
    })
}
