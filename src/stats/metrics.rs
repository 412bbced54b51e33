//! Statistics and metrics for rivers

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters owned by one socket
#[derive(Debug, Default)]
pub struct SocketCounters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    filtered: AtomicU64,
    dropped: AtomicU64,
}

impl SocketCounters {
    /// Record one outgoing message
    pub fn on_send(&self, len: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record one delivered message
    pub fn on_recv(&self, len: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record a message discarded by a filter or a stale survey tag
    pub fn on_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message a full peer inbox could not take
    pub fn on_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy
    pub fn snapshot(&self) -> SocketStats {
        SocketStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Socket-level statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketStats {
    /// Messages handed to `send`
    pub messages_sent: u64,
    /// Messages returned from `recv`
    pub messages_received: u64,
    /// Payload bytes sent
    pub bytes_sent: u64,
    /// Payload bytes received
    pub bytes_received: u64,
    /// Messages discarded before reaching `recv`
    pub filtered: u64,
    /// Per-peer deliveries skipped because the peer's inbox was full
    pub dropped: u64,
}

/// Summary of a scribe's life, returned by its background loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScribeReport {
    /// Messages written to the log
    pub messages_flushed: u64,
    /// Successful flushes (the final one included)
    pub flushes: u64,
    /// Flushes that failed and were retried later
    pub failed_flushes: u64,
    /// How long the scribe ran
    pub uptime: Duration,
}

impl ScribeReport {
    /// Average messages per successful flush
    pub fn average_batch(&self) -> f64 {
        if self.flushes > 0 {
            self.messages_flushed as f64 / self.flushes as f64
        } else {
            0.0
        }
    }
}
