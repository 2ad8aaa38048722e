//! Connection Metrics
//!
//! Per-connection counters for frames, dispatched events and faults.
//!
//! Counters are atomics shared between the run loop and every
//! [`ClientHandle`](crate::service::client::ClientHandle), so they can be read
//! from any task while the connection runs. There is no global instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for one connection
#[derive(Debug)]
pub struct ConnectionMetrics {
    /// Frames placed on the outbound queue
    pub frames_enqueued: AtomicU64,
    /// Frames written to the stream
    pub frames_sent: AtomicU64,
    /// Frames decoded from the stream
    pub frames_received: AtomicU64,
    /// Frames handed to the application handler
    pub events_dispatched: AtomicU64,
    /// Handshake payload size in bytes (0 without an authenticator)
    pub handshake_bytes: AtomicU64,
    /// Decode faults (truncated frames, bad lengths, unknown discriminants)
    pub decode_errors: AtomicU64,
    /// Transport, protocol-logic and handler faults
    pub connection_errors: AtomicU64,
    start_time: Instant,
}

impl ConnectionMetrics {
    /// Create a zeroed set of counters
    pub fn new() -> Self {
        Self {
            frames_enqueued: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            handshake_bytes: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn frame_enqueued(&self) {
        self.frames_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_written(&self, byte_count: u64) {
        self.handshake_bytes.store(byte_count, Ordering::Relaxed);
    }

    /// Record a fault, classified by kind
    pub fn fault(&self, err: &crate::error::ProtocolError) {
        if err.is_decode_fault() {
            self.decode_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.connection_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            handshake_bytes: self.handshake_bytes.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            frames_enqueued = snapshot.frames_enqueued,
            frames_sent = snapshot.frames_sent,
            frames_received = snapshot.frames_received,
            events_dispatched = snapshot.events_dispatched,
            handshake_bytes = snapshot.handshake_bytes,
            decode_errors = snapshot.decode_errors,
            connection_errors = snapshot.connection_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Connection metrics snapshot"
        );
    }
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_enqueued: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub events_dispatched: u64,
    pub handshake_bytes: u64,
    pub decode_errors: u64,
    pub connection_errors: u64,
    pub uptime_seconds: u64,
}
