//! Inbound message routing
//!
//! Classifies each JSON frame by its top-level `category` and dispatches to
//! the room directory, the network directory or direct target delivery.
//! Protocol errors are replied to the sender and never close the connection;
//! only the spam guard does that.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::core::directory::{RoomDirectory, SharedRoom};
use crate::core::events::EventBus;
use crate::core::message::{MemberInfo, NetworkEvent, Outbound, RoomEvent, RoomRequest};
use crate::core::network::NetworkDirectory;
use crate::core::registry::ConnectionRegistry;
use crate::core::room::{LeaveOutcome, Room};

pub struct MessageRouter {
    bus: Arc<EventBus>,
    rooms: Arc<RoomDirectory>,
    networks: Arc<NetworkDirectory>,
    registry: Arc<ConnectionRegistry>,
}

impl MessageRouter {
    pub fn new(
        bus: Arc<EventBus>,
        rooms: Arc<RoomDirectory>,
        networks: Arc<NetworkDirectory>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            bus,
            rooms,
            networks,
            registry,
        }
    }

    /// Interpret one inbound text frame from `sender`.
    pub fn route(&self, sender: &str, raw: &str) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!("unparseable frame from {}: {}", sender, e);
                self.reply_error(sender, "invalid message payload");
                return;
            }
        };

        match value.get("category").and_then(Value::as_str) {
            Some("room") => self.route_room(sender, value),
            Some("socket") => self.route_socket(sender, value),
            Some(other) => {
                warn!("wrong category '{}' from {}", other, sender);
                self.reply_error(
                    sender,
                    format!("incoming message with wrong category {}", other),
                );
            }
            None => self.route_network(sender, value),
        }
    }

    fn route_room(&self, sender: &str, value: Value) {
        let request: RoomRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                debug!("malformed room request from {}: {}", sender, e);
                self.reply_error(sender, "invalid message payload");
                return;
            }
        };

        match request {
            RoomRequest::Create { config } => {
                match self.rooms.create(self.member(sender), config) {
                    Ok(room) => {
                        let id = lock(&room).id.clone();
                        self.registry.track_room(sender, &id);
                    }
                    Err(e) => self.reply_error(sender, e.to_string()),
                }
            }

            RoomRequest::Join { room, password } => {
                self.with_room(sender, &room, |router, shared| {
                    let joined = lock(shared).join(router.member(sender), password.as_deref());
                    if joined.is_ok() {
                        router.registry.track_room(sender, &room);
                    }
                });
            }

            RoomRequest::Leave { room } => {
                self.with_room(sender, &room, |router, shared| {
                    if lock(shared).leave(sender) != LeaveOutcome::NotMember {
                        router.registry.untrack_room(sender, &room);
                    }
                });
            }

            RoomRequest::Kick { room, socket } => {
                self.with_room(sender, &room, |router, shared| {
                    let outcome = lock(shared).kick(sender, &socket);
                    router.after_removal(outcome, &socket, &room);
                });
            }

            RoomRequest::Ban { room, socket } => {
                self.with_room(sender, &room, |router, shared| {
                    let outcome = lock(shared).ban(sender, &socket);
                    router.after_removal(outcome, &socket, &room);
                });
            }

            RoomRequest::Unban { room, socket } => {
                self.with_room(sender, &room, |router, shared| {
                    lock(shared).unban(sender, &socket);
                });
            }
        }
    }

    /// `category:"socket"` carries direct delivery only: the payload is
    /// forwarded verbatim to the connection named by `socket`.
    fn route_socket(&self, sender: &str, value: Value) {
        match value.get("type").and_then(Value::as_str) {
            Some("target") => match value.get("socket").and_then(Value::as_str) {
                Some(target) if self.registry.contains(target) => {
                    self.bus.send(vec![target.to_string()], Outbound::Raw(value));
                }
                _ => self.reply_error(sender, "Target not found"),
            },
            Some(other) => {
                self.reply_error(sender, format!("unsupported message::{}", other))
            }
            None => self.reply_error(sender, "invalid message payload"),
        }
    }

    /// Frames without a category belong to the network rendezvous domain.
    fn route_network(&self, sender: &str, value: Value) {
        match value.get("type").and_then(Value::as_str) {
            Some("register") => match self.networks.register(sender, network_fields(&value)) {
                Ok(network) => {
                    self.reply(sender, Outbound::Network(NetworkEvent::RegisterAck { network }))
                }
                Err(e) => self.reply_error(sender, e.to_string()),
            },

            Some("update") => match self.networks.update(sender, network_fields(&value)) {
                Ok(network) => {
                    self.reply(sender, Outbound::Network(NetworkEvent::UpdateAck { network }))
                }
                Err(e) => self.reply_error(sender, e.to_string()),
            },

            Some("target") => match value.get("target").and_then(Value::as_str) {
                Some(target) if self.registry.contains(target) => {
                    self.bus.send(vec![target.to_string()], Outbound::Raw(value));
                }
                _ => self.reply_error(sender, "Target not found"),
            },

            Some(other) => {
                self.reply_error(sender, format!("unsupported message::{}", other))
            }
            None => self.reply_error(sender, "invalid message payload"),
        }
    }

    /// Look up a room and run `f` on it, replying not-found otherwise. The
    /// directory lock is released before the room lock is taken.
    fn with_room(&self, sender: &str, id: &str, f: impl FnOnce(&Self, &SharedRoom)) {
        match self.rooms.get(id) {
            Some(room) => f(self, &room),
            None => self.reply(sender, Outbound::room(RoomEvent::NotFound)),
        }
    }

    /// Membership bookkeeping after a kick or ban removed the target.
    fn after_removal(&self, outcome: Option<LeaveOutcome>, target: &str, room: &str) {
        match outcome {
            Some(LeaveOutcome::Left) | Some(LeaveOutcome::Emptied) => {
                self.registry.untrack_room(target, room);
            }
            _ => {}
        }
    }

    fn member(&self, sender: &str) -> MemberInfo {
        MemberInfo {
            id: sender.to_string(),
            info: self.registry.info_of(sender),
        }
    }

    fn reply(&self, sender: &str, message: Outbound) {
        self.bus.send(vec![sender.to_string()], message);
    }

    fn reply_error(&self, sender: &str, error: impl Into<String>) {
        self.reply(sender, Outbound::error(error));
    }
}

fn lock(room: &SharedRoom) -> std::sync::MutexGuard<'_, Room> {
    room.lock().unwrap_or_else(|e| e.into_inner())
}

/// Client-supplied record fields of a register/update frame.
fn network_fields(value: &Value) -> Map<String, Value> {
    value
        .get("network")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
