//! Shared harness: drives a ServerManager over in-memory channels, no
//! network involved.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use warp::ws::Message;

use signal_hub::config::ServerConfig;
use signal_hub::core::registry::{ClientMeta, ConnectionTicket};
use signal_hub::core::server::{ServerManager, SharedServerManager};

pub struct TestClient {
    pub ticket: ConnectionTicket,
    pub rx: UnboundedReceiver<Message>,
}

impl TestClient {
    pub fn send(&self, manager: &ServerManager, payload: &Value) -> bool {
        manager.handle_message(&self.ticket.id, &payload.to_string())
    }

    /// All buffered text frames, parsed. Control frames are skipped.
    pub fn frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let Ok(text) = frame.to_str() {
                frames.push(serde_json::from_str(text).expect("frame is not valid JSON"));
            }
        }
        frames
    }

    pub fn next_frame(&mut self) -> Value {
        let frames = self.frames();
        assert!(!frames.is_empty(), "expected at least one frame");
        frames.into_iter().next().unwrap()
    }

    /// Whether a close frame is buffered.
    pub fn saw_close(&mut self) -> bool {
        let mut saw = false;
        while let Ok(frame) = self.rx.try_recv() {
            if frame.is_close() {
                saw = true;
            }
        }
        saw
    }
}

/// Manager with spam detection disabled so rapid test traffic never strikes.
pub fn manager() -> SharedServerManager {
    manager_with(ServerConfig {
        spam_duration: Duration::from_millis(0),
        ..ServerConfig::default()
    })
}

pub fn manager_with(config: ServerConfig) -> SharedServerManager {
    Arc::new(ServerManager::new(&config))
}

/// Connect a client whose id starts with `name`; the connect-time welcome
/// frame is consumed.
pub fn connect(manager: &ServerManager, name: &str) -> TestClient {
    let mut client = connect_raw(manager, name);
    let welcome = client.next_frame();
    assert_eq!(welcome["type"], "welcome");
    client
}

/// Connect without consuming the welcome frame.
pub fn connect_raw(manager: &ServerManager, name: &str) -> TestClient {
    let (tx, rx) = mpsc::unbounded_channel();
    let ticket = manager.connect(
        tx,
        &ClientMeta {
            user_agent: Some(name.to_string()),
            remote_addr: None,
        },
    );
    TestClient { ticket, rx }
}
