//! Server configuration module
//! Handles tuning parameters for the rendezvous server

use crate::constants::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HOST, DEFAULT_MAX_STRIKES, DEFAULT_PORT,
    DEFAULT_SPAM_DURATION_MS, DEFAULT_SPAM_RESET_MS,
};
use crate::error::{Result, SignalHubError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration parameters.
///
/// The core components never read the environment themselves; the binary
/// parses everything once through [`ServerConfig::from_env`] and hands the
/// struct down.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interval between heartbeat sweeps; a dead peer is detected within
    /// two intervals.
    pub heartbeat_interval: Duration,
    /// Messages arriving faster than this earn a strike.
    pub spam_duration: Duration,
    /// Quiet period after which the strike count is forgiven.
    pub spam_reset: Duration,
    /// Strike count at which the connection is force-closed.
    pub max_strikes: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            spam_duration: Duration::from_millis(DEFAULT_SPAM_DURATION_MS),
            spam_reset: Duration::from_millis(DEFAULT_SPAM_RESET_MS),
            max_strikes: DEFAULT_MAX_STRIKES,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables if available.
    ///
    /// Unset variables fall back to defaults; set-but-unparseable values are
    /// a hard error rather than a silent fallback.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = parsed_var("PORT")?.unwrap_or(defaults.port);

        let heartbeat_interval = parsed_var::<u64>("HEARTBEAT_INTERVAL")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.heartbeat_interval);
        let spam_duration = parsed_var::<u64>("SPAM_DURATION")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.spam_duration);
        let spam_reset = parsed_var::<u64>("SPAM_RESET")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.spam_reset);
        let max_strikes = parsed_var("MAX_STRIKES")?.unwrap_or(defaults.max_strikes);

        Ok(Self {
            host,
            port,
            heartbeat_interval,
            spam_duration,
            spam_reset,
            max_strikes,
        })
    }
}

fn parsed_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            SignalHubError::ConfigError(format!("{} must be a valid number, got '{}'", key, raw))
        }),
        Err(_) => Ok(None),
    }
}
