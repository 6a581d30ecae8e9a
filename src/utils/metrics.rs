//! Observability and Metrics
//!
//! Counters for every outcome the connection pipeline can reach, so operators
//! (and tests) can see how many messages were dropped and why.
//!
//! Uses atomic counters for thread-safe metrics collection. A collector is
//! shared by handle between all pipelines of one service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections served
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Connections refused because the service was at capacity
    pub connections_refused: AtomicU64,
    /// Connections that ended with a stream error
    pub stream_errors: AtomicU64,
    /// Frames that passed the size check
    pub frames_received: AtomicU64,
    /// Frames skipped for exceeding the size bound
    pub frames_oversized: AtomicU64,
    /// Frames that did not parse as a message envelope
    pub decode_errors: AtomicU64,
    /// Messages with no registered handler
    pub unknown_kinds: AtomicU64,
    /// Failed peer table updates
    pub peer_update_errors: AtomicU64,
    /// Handler invocations
    pub handler_calls: AtomicU64,
    /// Failed handler invocations
    pub handler_errors: AtomicU64,
    /// Responses that failed to serialize
    pub encode_errors: AtomicU64,
    /// Responses written back
    pub responses_sent: AtomicU64,
    /// Payload bytes received in accepted frames
    pub bytes_received: AtomicU64,
    /// Payload bytes sent in responses
    pub bytes_sent: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_refused: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_oversized: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            unknown_kinds: AtomicU64::new(0),
            peer_update_errors: AtomicU64::new(0),
            handler_calls: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            encode_errors: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted frame
    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_oversized(&self) {
        self.frames_oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_kind(&self) {
        self.unknown_kinds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_update_error(&self) {
        self.peer_update_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_call(&self) {
        self.handler_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response written to the stream
    pub fn response_sent(&self, byte_count: u64) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_refused: self.connections_refused.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_oversized: self.frames_oversized.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unknown_kinds: self.unknown_kinds.load(Ordering::Relaxed),
            peer_update_errors: self.peer_update_errors.load(Ordering::Relaxed),
            handler_calls: self.handler_calls.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_refused = snapshot.connections_refused,
            stream_errors = snapshot.stream_errors,
            frames_received = snapshot.frames_received,
            frames_oversized = snapshot.frames_oversized,
            decode_errors = snapshot.decode_errors,
            unknown_kinds = snapshot.unknown_kinds,
            peer_update_errors = snapshot.peer_update_errors,
            handler_calls = snapshot.handler_calls,
            handler_errors = snapshot.handler_errors,
            encode_errors = snapshot.encode_errors,
            responses_sent = snapshot.responses_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            uptime_seconds = snapshot.uptime_seconds,
            "Protocol metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_refused: u64,
    pub stream_errors: u64,
    pub frames_received: u64,
    pub frames_oversized: u64,
    pub decode_errors: u64,
    pub unknown_kinds: u64,
    pub peer_update_errors: u64,
    pub handler_calls: u64,
    pub handler_errors: u64,
    pub encode_errors: u64,
    pub responses_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}
