//! Rate limiting module to prevent abuse
//!
//! Hybrid rate+cooldown scheme: messages arriving faster than
//! `spam_duration` earn strikes, and the strike count is only forgiven
//! after a quiet period of at least `spam_reset`. Rapid bursts are punished
//! durably within a session while an isolated late message is forgiven.

use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::core::connection::Connection;

pub struct SpamGuard {
    spam_duration: Duration,
    spam_reset: Duration,
    max_strikes: u32,
}

impl SpamGuard {
    pub fn new(spam_duration: Duration, spam_reset: Duration, max_strikes: u32) -> Self {
        Self {
            spam_duration,
            spam_reset,
            max_strikes,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.spam_duration, config.spam_reset, config.max_strikes)
    }

    /// Evaluate an inbound message. Returns true when the connection has
    /// exhausted its strikes and should be force-closed.
    pub fn check(&self, conn: &mut Connection) -> bool {
        self.check_at(conn, Instant::now())
    }

    /// Clock-injectable core of [`check`].
    pub fn check_at(&self, conn: &mut Connection, now: Instant) -> bool {
        if let Some(last) = conn.last_message {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.spam_duration {
                // No cap: the caller closes on the check that reaches the
                // threshold, so overshoot is irrelevant.
                conn.strikes += 1;
            } else if conn.strikes < self.max_strikes && elapsed >= self.spam_reset {
                conn.strikes = 0;
            }
        }

        conn.last_message = Some(now);
        conn.strikes >= self.max_strikes
    }
}
