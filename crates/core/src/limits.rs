//! Size, capacity, and timing limits for the session client.
//!
//! The socket service rejects frames above 32KB. Payloads are base64-encoded
//! on some transports, so the usable budget is three quarters of that.
//!
//! Values here are defaults; `SessionConfig` can override the tunable ones.

use std::time::Duration;

// === Frame Limits ===

/// Hard frame ceiling enforced by the service (32KB).
pub const MAX_FRAME_SIZE_BYTES: usize = 32 * 1024;

/// Serialized event size at which chunking kicks in (24KB).
///
/// 75% of the frame ceiling, leaving room for base64 inflation.
pub const MAX_EVENT_SIZE_BYTES: usize = MAX_FRAME_SIZE_BYTES * 3 / 4;

/// Payload bytes carried by a single chunk (11KB).
///
/// Leaves room for JSON string escaping of the fragment.
pub const CHUNK_SIZE_BYTES: usize = 11 * 1024;

// === Queue Limits ===

/// Capacity of each inbound/outbound session queue.
pub const QUEUE_CAPACITY: usize = 200;

// === Timing ===

/// Delay between reconnect attempts after the first immediate one.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long events are buffered at start-up before giving up on a session.
pub const SHUTDOWN_DELAY: Duration = Duration::from_secs(5);

/// Interval between pairing status polls.
pub const DEVICE_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);
