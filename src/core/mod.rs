//! Core functionality for the rendezvous server

pub mod connection;
pub mod directory;
pub mod events;
pub mod message;
pub mod network;
pub mod rate_limiter;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;

// Re-export main components for convenience
pub use connection::Connection;
pub use directory::{RoomDirectory, SharedRoom};
pub use events::{BusEvent, EventBus, SendIntent};
pub use message::{MemberInfo, NetworkRecord, Outbound, RoomConfig, RoomInfo};
pub use network::{NetworkDirectory, Registration};
pub use rate_limiter::SpamGuard;
pub use registry::{ClientMeta, ConnectionRegistry, ConnectionTicket};
pub use room::{LeaveOutcome, Room};
pub use router::MessageRouter;
pub use server::{ServerManager, SharedServerManager};
