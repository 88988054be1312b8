//! The client info handshake event.
//!
//! The service expects this as the first frame on every (re)connected socket
//! and only accepts forwarded events after it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::events::{AssuranceEvent, EventSequence, EventType, DEFAULT_VENDOR};

/// Device and application description sent on connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default = "default_sdk_version")]
    pub sdk_version: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default)]
    pub app_version: Option<String>,
    /// Extra key/values shown as app settings in the inspector
    #[serde(default)]
    pub app_settings: BTreeMap<String, String>,
}

fn default_sdk_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

fn default_device_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            sdk_version: default_sdk_version(),
            platform: default_platform(),
            device_name: default_device_name(),
            app_version: None,
            app_settings: BTreeMap::new(),
        }
    }
}

impl ClientInfo {
    /// Builds the handshake event.
    pub fn to_event(&self, sequence: &EventSequence) -> AssuranceEvent {
        let payload = json!({
            "type": "connect",
            "version": self.sdk_version,
            "deviceInfo": {
                "Canonical platform name": self.platform,
                "Device name": self.device_name,
                "Architecture": std::env::consts::ARCH,
                "App version": self.app_version,
            },
            "appSettings": self.app_settings,
        });
        AssuranceEvent::new(sequence, DEFAULT_VENDOR, EventType::Client, payload.as_object().cloned())
    }
}
