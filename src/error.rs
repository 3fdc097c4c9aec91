use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum SignalHubError {
    // Room errors
    RoomExists(String),

    // Network rendezvous errors
    HostExists,
    HostNotFound,

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for SignalHubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomExists(id) => write!(f, "room {} already exists", id),
            // These two are sent verbatim as protocol error replies
            Self::HostExists => write!(f, "Host already exists"),
            Self::HostNotFound => write!(f, "Host not found"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for SignalHubError {}

// Generic result type for signal-hub
pub type Result<T> = std::result::Result<T, SignalHubError>;
