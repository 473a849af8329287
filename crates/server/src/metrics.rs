use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// Tail stream metrics tracker
#[derive(Clone)]
pub struct StreamMetrics {
    inner: Arc<StreamMetricsInner>,
}

struct StreamMetricsInner {
    /// Response streams currently open
    active_streams: AtomicU64,

    /// Response streams opened (lifetime)
    total_streams: AtomicU64,

    /// Records written to clients
    records_sent: AtomicU64,

    /// Bytes written to clients
    bytes_sent: AtomicU64,

    /// Peer fetches that merged into a response
    peer_merged: AtomicU64,

    /// Failed peer fetches per host (host -> count)
    peer_failures: RwLock<HashMap<String, u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub active_streams: u64,
    pub total_streams: u64,
    pub records_sent: u64,
    pub bytes_sent: u64,
    pub peer_merged: u64,
    pub peer_failures: HashMap<String, u64>,
}

/// Decrements the active-stream gauge when the response body is dropped,
/// including on abrupt client disconnects.
pub struct StreamGuard {
    metrics: StreamMetrics,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.metrics.stream_ended();
    }
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StreamMetricsInner {
                active_streams: AtomicU64::new(0),
                total_streams: AtomicU64::new(0),
                records_sent: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
                peer_merged: AtomicU64::new(0),
                peer_failures: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Called when a response stream starts; the guard ends it.
    pub fn stream_started(&self) -> StreamGuard {
        self.inner.active_streams.fetch_add(1, Ordering::Relaxed);
        self.inner.total_streams.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            active = self.inner.active_streams.load(Ordering::Relaxed),
            "Stream started"
        );

        StreamGuard { metrics: self.clone() }
    }

    fn stream_ended(&self) {
        // Atomic check-and-decrement so the gauge can never wrap below zero
        let _ = self.inner.active_streams.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| if current > 0 { Some(current - 1) } else { None },
        );

        tracing::debug!(
            active = self.inner.active_streams.load(Ordering::Relaxed),
            "Stream ended"
        );
    }

    /// Called for every chunk written to a client. A chunk holds whole
    /// newline-terminated records, possibly several from one peer.
    pub fn record_sent(&self, chunk: &[u8]) {
        let records = memchr::memchr_iter(b'\n', chunk).count() as u64;
        self.inner.records_sent.fetch_add(records, Ordering::Relaxed);
        self.inner.bytes_sent.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }

    pub fn peer_merged(&self) {
        self.inner.peer_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_failed(&self, host: &str) {
        let mut failures = self.inner.peer_failures.write();
        *failures.entry(host.to_string()).or_insert(0) += 1;
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active_streams.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_streams: self.active_count(),
            total_streams: self.inner.total_streams.load(Ordering::Relaxed),
            records_sent: self.inner.records_sent.load(Ordering::Relaxed),
            bytes_sent: self.inner.bytes_sent.load(Ordering::Relaxed),
            peer_merged: self.inner.peer_merged.load(Ordering::Relaxed),
            peer_failures: self.inner.peer_failures.read().clone(),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}
