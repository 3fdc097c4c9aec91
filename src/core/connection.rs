//! WebSocket connection management
//! Handles the state of a single client connection

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value;
use std::time::Instant;
use tokio::sync::mpsc;
use warp::ws::Message;

/// Represents the state of a single WebSocket connection.
///
/// Transport writes go through the unbounded `sender`; the paired receiver
/// is drained by a per-socket forwarding task, so nothing here ever blocks
/// on a slow client.
pub struct Connection {
    pub id: String,
    /// Distinguishes this registration from an earlier one that was
    /// superseded under the same id.
    pub epoch: u64,
    pub sender: mpsc::UnboundedSender<Message>,
    /// Client info captured at welcome time, echoed in room member lists.
    pub info: Value,
    /// Liveness flag driven by the heartbeat protocol.
    pub is_alive: bool,
    /// Spam strikes accumulated this session.
    pub strikes: u32,
    pub last_message: Option<Instant>,
    /// Ids of the rooms this connection is currently a member of,
    /// maintained by the router.
    pub rooms: Vec<String>,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(id: String, epoch: u64, sender: mpsc::UnboundedSender<Message>, info: Value) -> Self {
        Self {
            id,
            epoch,
            sender,
            info,
            is_alive: true,
            strikes: 0,
            last_message: None,
            rooms: Vec::new(),
            connected_at: Utc::now(),
        }
    }

    /// Send a text frame through this connection.
    pub fn send_text(&self, text: &str) -> bool {
        self.send_frame(Message::text(text))
    }

    /// Send an arbitrary frame (ping/close) through this connection.
    pub fn send_frame(&self, frame: Message) -> bool {
        match self.sender.send(frame) {
            Ok(_) => true,
            Err(_) => {
                warn!("failed to send frame to client {}", self.id);
                false
            }
        }
    }
}
