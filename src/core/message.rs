//! Wire protocol types
//!
//! Every frame is a JSON object discriminated by `type`, with the room
//! domain additionally carrying a `category` field. Reason codes are kept
//! verbatim from the deployed protocol (misspelling included) for
//! compatibility with existing clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type SocketId = String;

/// A room member as seen on the wire: connection id plus whatever client
/// info was captured at welcome time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberInfo {
    pub id: SocketId,
    #[serde(default)]
    pub info: Value,
}

/// Room summary for directory listings and the connect-time snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    /// None means unlimited
    pub limit: Option<usize>,
    pub locked: bool,
}

/// Creation parameters supplied by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Why a join or moderation request was refused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeniedReason {
    #[serde(rename = "room-unothorized-full")]
    Full,
    #[serde(rename = "room-unothorized-banned")]
    Banned,
    #[serde(rename = "room-unothorized-host")]
    NotHost,
    #[serde(rename = "room-unothorized-password")]
    Password,
    #[serde(rename = "room-unothorized-duplicate")]
    Duplicate,
}

/// Client-to-server room-domain requests (`category: "room"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RoomRequest {
    #[serde(rename = "room-create")]
    Create { config: RoomConfig },

    #[serde(rename = "room-join")]
    Join {
        room: String,
        #[serde(default)]
        password: Option<String>,
    },

    #[serde(rename = "room-leave")]
    Leave { room: String },

    #[serde(rename = "room-kick")]
    Kick { room: String, socket: SocketId },

    #[serde(rename = "room-ban")]
    Ban { room: String, socket: SocketId },

    #[serde(rename = "room-unban")]
    Unban { room: String, socket: SocketId },
}

/// Server-to-client room-domain events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RoomEvent {
    /// Acknowledgement to the creator of a brand-new room.
    #[serde(rename = "room-created")]
    Created { room: String },

    /// Sent to a joining member: the members present before the join, the
    /// room id and the current host.
    #[serde(rename = "room-welcome")]
    Welcome {
        sockets: Vec<MemberInfo>,
        room: String,
        host: SocketId,
    },

    /// Broadcast to existing members when someone joins.
    #[serde(rename = "room-join")]
    Join { socket: MemberInfo },

    /// Broadcast to remaining members when someone leaves.
    #[serde(rename = "room-leave")]
    Leave { socket: SocketId, room: String },

    /// Broadcast after host succession.
    #[serde(rename = "room-host")]
    Host { host: SocketId },

    #[serde(rename = "room-unothorized")]
    Unauthorized { reason: DeniedReason },

    #[serde(rename = "room-notFound")]
    NotFound,
}

/// Server-to-client socket-domain events (`category: "socket"`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SocketEvent {
    /// First frame after connect: assigned id plus the room directory
    /// snapshot.
    #[serde(rename = "welcome")]
    Welcome {
        id: SocketId,
        rooms: Vec<RoomInfo>,
    },
}

/// A registered network record in the host directory.
///
/// `id` and `host` are always the owning connection id; the remaining
/// fields are whatever the registering client supplied (name, limit,
/// current, ...), flattened back onto the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkRecord {
    pub id: SocketId,
    pub host: SocketId,
    pub registered_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Server-to-client network-domain events (no category field).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NetworkEvent {
    #[serde(rename = "register-ack")]
    RegisterAck { network: NetworkRecord },

    #[serde(rename = "update-ack")]
    UpdateAck { network: NetworkRecord },

    /// Broadcast when a registered host disconnects.
    #[serde(rename = "delete")]
    Deleted { network: NetworkRecord },

    /// Generic protocol-error reply; never closes the connection.
    #[serde(rename = "error")]
    Error { error: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Room,
    Socket,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoomEnvelope {
    pub category: MessageCategory,
    #[serde(flatten)]
    pub event: RoomEvent,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SocketEnvelope {
    pub category: MessageCategory,
    #[serde(flatten)]
    pub event: SocketEvent,
}

/// Everything the server can put on the wire.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Outbound {
    Room(RoomEnvelope),
    Socket(SocketEnvelope),
    Network(NetworkEvent),
    /// Verbatim forward of a target message; the payload is not reshaped.
    Raw(Value),
}

impl Outbound {
    pub fn room(event: RoomEvent) -> Self {
        Self::Room(RoomEnvelope {
            category: MessageCategory::Room,
            event,
        })
    }

    pub fn socket(event: SocketEvent) -> Self {
        Self::Socket(SocketEnvelope {
            category: MessageCategory::Socket,
            event,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Network(NetworkEvent::Error {
            error: message.into(),
        })
    }
}
