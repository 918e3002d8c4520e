//! Transport Configuration
//!
//! Reconnect policy and endpoint selection for the push channel. The policy is
//! a tunable configuration surface (file or environment, see
//! [`crate::config`]), not a command-line flag.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of reconnect attempts before giving up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay between reconnect attempts in milliseconds
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Default push channel endpoint
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:3001";

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Push channel URL (`ws://` or `wss://`)
    pub endpoint: String,

    /// Reconnection attempts after a close (0 = never reconnect)
    ///
    /// The counter resets when a connection opens.
    pub max_reconnect_attempts: u32,

    /// Delay between reconnection attempts in milliseconds
    pub reconnect_delay_ms: u64,

    /// Per-subscriber queue capacity
    pub subscriber_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            subscriber_capacity: 256,
        }
    }
}

impl TransportConfig {
    /// Create a configuration for a specific endpoint with default policy
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Delay between reconnection attempts
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Whether the endpoint uses TLS
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.endpoint.starts_with("wss://")
    }
}
