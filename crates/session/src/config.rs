//! Session configuration.

use std::time::Duration;

use assurance_core::limits::{
    CHUNK_SIZE_BYTES, DEVICE_STATUS_POLL_INTERVAL, MAX_EVENT_SIZE_BYTES, QUEUE_CAPACITY,
    RECONNECT_DELAY, SHUTDOWN_DELAY,
};
use assurance_core::DEFAULT_SERVICE_HOST;
use serde::{Deserialize, Serialize};

/// Tunables for sessions and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base host of the inspection service
    #[serde(default = "default_host")]
    pub host: String,
    /// Org id appended to the socket URL after PIN entry
    #[serde(default)]
    pub org_id: Option<String>,
    /// Capacity of each session queue and of the pre-session buffer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Delay before the second and later reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How long events are buffered waiting for a pairing deep link
    #[serde(default = "default_shutdown_delay_ms")]
    pub shutdown_delay_ms: u64,
    /// Encoded size at which events get chunked
    #[serde(default = "default_max_event_size_bytes")]
    pub max_event_size_bytes: usize,
    /// Payload bytes per chunk
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,
    /// Quick-connect device status poll interval
    #[serde(default = "default_device_poll_interval_ms")]
    pub device_poll_interval_ms: u64,
}

fn default_host() -> String {
    DEFAULT_SERVICE_HOST.to_string()
}

fn default_queue_capacity() -> usize {
    QUEUE_CAPACITY
}

fn default_reconnect_delay_ms() -> u64 {
    RECONNECT_DELAY.as_millis() as u64
}

fn default_shutdown_delay_ms() -> u64 {
    SHUTDOWN_DELAY.as_millis() as u64
}

fn default_max_event_size_bytes() -> usize {
    MAX_EVENT_SIZE_BYTES
}

fn default_chunk_size_bytes() -> usize {
    CHUNK_SIZE_BYTES
}

fn default_device_poll_interval_ms() -> u64 {
    DEVICE_STATUS_POLL_INTERVAL.as_millis() as u64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            org_id: None,
            queue_capacity: default_queue_capacity(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            shutdown_delay_ms: default_shutdown_delay_ms(),
            max_event_size_bytes: default_max_event_size_bytes(),
            chunk_size_bytes: default_chunk_size_bytes(),
            device_poll_interval_ms: default_device_poll_interval_ms(),
        }
    }
}

impl SessionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_millis(self.shutdown_delay_ms)
    }

    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_millis(self.device_poll_interval_ms)
    }

    /// Org id, if configured and non-blank.
    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}
