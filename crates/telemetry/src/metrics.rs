//! In-process session metrics.
//!
//! Counters are process-wide and never exported; the client logs a snapshot
//! on shutdown and tests read them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Running mean and worst case of a millisecond timing.
#[derive(Debug, Default)]
pub struct Latency {
    sum: AtomicU64,
    count: AtomicU64,
    max: AtomicU64,
}

impl Latency {
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            count => self.sum.load(Ordering::Relaxed) as f64 / count as f64,
        }
    }
}

/// Collected metrics for the session client.
#[derive(Debug, Default)]
pub struct Metrics {
    // Outbound
    pub events_queued: Counter,
    pub events_dropped_queue_full: Counter,
    pub events_dropped_unchunkable: Counter,
    pub events_dropped_no_session: Counter,
    pub events_sent: Counter,
    pub chunks_sent: Counter,
    pub send_errors: Counter,

    // Inbound
    pub inbound_received: Counter,
    pub unknown_commands: Counter,

    // Lifecycle
    pub sessions_created: Counter,
    pub sessions_terminated: Counter,
    pub reconnect_attempts: Counter,

    pub send_latency_ms: Latency,

    // Gauges
    pub outbound_depth: Gauge,
    pub inbound_depth: Gauge,
    pub connected: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_queued: u64,
    pub events_dropped_queue_full: u64,
    pub events_dropped_unchunkable: u64,
    pub events_dropped_no_session: u64,
    pub events_sent: u64,
    pub chunks_sent: u64,
    pub send_errors: u64,
    pub inbound_received: u64,
    pub unknown_commands: u64,
    pub sessions_created: u64,
    pub sessions_terminated: u64,
    pub reconnect_attempts: u64,
    pub send_latency_mean_ms: f64,
    pub send_latency_max_ms: u64,
    pub outbound_depth: u64,
    pub inbound_depth: u64,
    pub connected: bool,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_queued: self.events_queued.get(),
            events_dropped_queue_full: self.events_dropped_queue_full.get(),
            events_dropped_unchunkable: self.events_dropped_unchunkable.get(),
            events_dropped_no_session: self.events_dropped_no_session.get(),
            events_sent: self.events_sent.get(),
            chunks_sent: self.chunks_sent.get(),
            send_errors: self.send_errors.get(),
            inbound_received: self.inbound_received.get(),
            unknown_commands: self.unknown_commands.get(),
            sessions_created: self.sessions_created.get(),
            sessions_terminated: self.sessions_terminated.get(),
            reconnect_attempts: self.reconnect_attempts.get(),
            send_latency_mean_ms: self.send_latency_ms.mean(),
            send_latency_max_ms: self.send_latency_ms.max(),
            outbound_depth: self.outbound_depth.get(),
            inbound_depth: self.inbound_depth.get(),
            connected: self.connected.get() > 0,
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
