//! Ingestion metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics shared by every registered source
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total batches forwarded
    pub batches_received: AtomicU64,

    /// Total samples forwarded
    pub samples_received: AtomicU64,

    /// Samples flagged with bad timestamp quality
    pub bad_timestamps: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one forwarded batch
    pub fn record_batch(&self, samples: usize, bad_timestamps: usize) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.samples_received
            .fetch_add(samples as u64, Ordering::Relaxed);
        self.bad_timestamps
            .fetch_add(bad_timestamps as u64, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            samples_received: self.samples_received.load(Ordering::Relaxed),
            bad_timestamps: self.bad_timestamps.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total batches forwarded
    pub batches_received: u64,

    /// Total samples forwarded
    pub samples_received: u64,

    /// Samples flagged with bad timestamp quality
    pub bad_timestamps: u64,
}
