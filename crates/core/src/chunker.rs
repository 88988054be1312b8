//! Splits oversized events into frames the socket service accepts.
//!
//! Only payload bytes are splittable. Each fragment becomes its own event with
//! payload `{chunkData}` and metadata `{chunkId, chunkTotal, chunkSequenceNumber}`;
//! the service reassembles them by `chunkId` in sequence order.

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::events::{AssuranceEvent, EventSequence, Payload};
use crate::limits::{CHUNK_SIZE_BYTES, MAX_EVENT_SIZE_BYTES};

pub const CHUNK_DATA_KEY: &str = "chunkData";
pub const CHUNK_ID_KEY: &str = "chunkId";
pub const CHUNK_TOTAL_KEY: &str = "chunkTotal";
pub const CHUNK_SEQUENCE_KEY: &str = "chunkSequenceNumber";

/// Event chunker.
#[derive(Debug, Clone)]
pub struct EventChunker {
    sequence: EventSequence,
    max_event_size: usize,
    chunk_size: usize,
}

impl EventChunker {
    pub fn new(sequence: EventSequence) -> Self {
        Self::with_limits(sequence, MAX_EVENT_SIZE_BYTES, CHUNK_SIZE_BYTES)
    }

    pub fn with_limits(sequence: EventSequence, max_event_size: usize, chunk_size: usize) -> Self {
        Self {
            sequence,
            max_event_size,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns `[event]` when it fits, its fragments when it does not, and
    /// nothing when it cannot be split.
    pub fn chunk(&self, event: AssuranceEvent) -> Vec<AssuranceEvent> {
        let size = match event.encoded_len() {
            Ok(size) => size,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Dropping event that cannot be encoded");
                return Vec::new();
            }
        };

        if size < self.max_event_size {
            return vec![event];
        }

        let Some(payload) = event.payload.as_ref() else {
            warn!(
                event_id = %event.id,
                size,
                "Dropping oversized event without payload, only payloads can be chunked"
            );
            return Vec::new();
        };

        let data = match serde_json::to_string(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Dropping event with unencodable payload");
                return Vec::new();
            }
        };

        let fragments = split_at_char_boundaries(&data, self.chunk_size);
        let chunk_id = Uuid::new_v4().to_string();
        let total = fragments.len();

        fragments
            .into_iter()
            .enumerate()
            .map(|(index, fragment)| {
                let mut payload = Payload::new();
                payload.insert(CHUNK_DATA_KEY.into(), Value::String(fragment.to_string()));

                let mut metadata = Payload::new();
                metadata.insert(CHUNK_ID_KEY.into(), Value::String(chunk_id.clone()));
                metadata.insert(CHUNK_TOTAL_KEY.into(), Value::from(total));
                metadata.insert(CHUNK_SEQUENCE_KEY.into(), Value::from(index));

                AssuranceEvent {
                    id: Uuid::new_v4(),
                    vendor: event.vendor.clone(),
                    event_type: event.event_type,
                    payload: Some(payload),
                    event_number: self.sequence.next(),
                    timestamp: event.timestamp,
                    metadata: Some(metadata),
                }
            })
            .collect()
    }
}

/// Splits into pieces of at most `max` bytes without cutting a UTF-8 sequence.
fn split_at_char_boundaries(data: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::with_capacity(data.len().div_ceil(max));
    let mut start = 0;

    while start < data.len() {
        let mut end = (start + max).min(data.len());
        while !data.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // a single character wider than `max`
            end = start + data[start..].chars().next().map_or(1, char::len_utf8);
        }
        pieces.push(&data[start..end]);
        start = end;
    }

    pieces
}
