//! Socket configuration.

use serde::{Deserialize, Serialize};

/// WebSocket transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Upper bound on TCP + TLS + upgrade time in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Disable Nagle's algorithm on the TCP stream
    #[serde(default = "default_disable_nagle")]
    pub disable_nagle: bool,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_disable_nagle() -> bool {
    true
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            disable_nagle: default_disable_nagle(),
        }
    }
}
