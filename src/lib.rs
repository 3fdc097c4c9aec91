//! Signal Hub - a WebSocket rendezvous and signaling server
//!
//! This library provides the core functionality for a signaling server:
//! connection lifecycle with heartbeat liveness, room/network membership
//! management and direct targeted message forwarding.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;

// Re-export main components
pub use config::*;
pub use constants::*;
