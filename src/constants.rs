// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

// Connection hygiene defaults (milliseconds)
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_SPAM_DURATION_MS: u64 = 200;
pub const DEFAULT_SPAM_RESET_MS: u64 = 1500;
pub const DEFAULT_MAX_STRIKES: u32 = 3;
