//! Diagnostic event model and wire format.
//!
//! Outbound frames are JSON objects:
//! `{eventID, vendor, type, payload?, eventNumber, timestamp, metadata?}`
//! with `timestamp` in milliseconds since the epoch.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// JSON object used for payloads and metadata.
pub type Payload = serde_json::Map<String, Value>;

/// Vendor stamped on events produced by the client itself.
pub const DEFAULT_VENDOR: &str = "com.assurance.mobile";

/// Command types carried by inbound control events.
pub mod commands {
    pub const START_EVENT_FORWARDING: &str = "startEventForwarding";
    pub const CONFIG_UPDATE: &str = "configUpdate";
    pub const SCREENSHOT: &str = "screenshot";
    pub const LOG_FORWARDING: &str = "logForwarding";
    pub const FAKE_EVENT: &str = "fakeEvent";
}

/// Event category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Log,
    Control,
    Client,
    Blob,
    #[default]
    #[serde(other)]
    Generic,
}

/// How prominently a client log line is shown by the inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogVisibility {
    Low,
    Normal,
    High,
    Critical,
}

/// Process-wide event counter.
///
/// Cloned handles share one atomic, so every event built from any clone gets
/// a number strictly greater than all earlier ones.
#[derive(Debug, Clone, Default)]
pub struct EventSequence(Arc<AtomicI32>);

impl EventSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next event number.
    pub fn next(&self) -> i32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last number handed out (0 if none).
    pub fn current(&self) -> i32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A diagnostic event exchanged with the inspection service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssuranceEvent {
    #[serde(rename = "eventID")]
    pub id: Uuid,
    pub vendor: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    pub event_number: i32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Payload>,
}

/// Inbound frame shape; the service may omit fields the client always sets.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "eventID")]
    id: Option<Uuid>,
    #[serde(default)]
    vendor: String,
    #[serde(rename = "type", default)]
    event_type: EventType,
    payload: Option<Payload>,
    timestamp: Option<i64>,
    metadata: Option<Payload>,
}

impl AssuranceEvent {
    /// Creates an event stamped with the next number from `sequence`.
    pub fn new(
        sequence: &EventSequence,
        vendor: impl Into<String>,
        event_type: EventType,
        payload: Option<Payload>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vendor: vendor.into(),
            event_type,
            payload,
            event_number: sequence.next(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Creates a client log event shown in the inspector's log view.
    pub fn client_log(sequence: &EventSequence, message: &str, visibility: LogVisibility) -> Self {
        let payload = serde_json::json!({
            "type": "log",
            "detail": {
                "message": message,
                "visibility": visibility,
            }
        });
        Self::new(sequence, DEFAULT_VENDOR, EventType::Client, payload.as_object().cloned())
    }

    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Decodes an inbound frame, assigning it a local event number.
    pub fn decode(text: &str, sequence: &EventSequence) -> Result<Self> {
        let wire: WireEvent = serde_json::from_str(text)?;
        let timestamp = wire
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(Self {
            id: wire.id.unwrap_or_else(Uuid::new_v4),
            vendor: wire.vendor,
            event_type: wire.event_type,
            payload: wire.payload,
            event_number: sequence.next(),
            timestamp,
            metadata: wire.metadata,
        })
    }

    /// Serializes to the outbound wire frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Size of the encoded frame in bytes.
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }

    /// Command type of a control event (`payload.type`).
    pub fn control_type(&self) -> Option<&str> {
        if self.event_type != EventType::Control {
            return None;
        }
        self.payload.as_ref()?.get("type")?.as_str()
    }

    /// Command arguments of a control event (`payload.detail`).
    pub fn control_detail(&self) -> Option<&Payload> {
        if self.event_type != EventType::Control {
            return None;
        }
        self.payload.as_ref()?.get("detail")?.as_object()
    }
}
