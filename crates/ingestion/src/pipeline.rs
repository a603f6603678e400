//! Ingestion Pipeline main entry

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{Sample, SampleCallback, SampleSource};
use metrics::counter;
use tracing::{debug, info, instrument};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};

/// Ingestion Pipeline
///
/// Owns every registered sample source and fans their batches into one
/// callback, counting what passes through.
pub struct IngestionPipeline {
    /// Registered sources, ordered by ID
    sources: BTreeMap<String, Box<dyn SampleSource>>,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// Register a sample source
    ///
    /// Source IDs prefix every sample key, so they must be unique.
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source),
        fields(source_id = %source.source_id())
    )]
    pub fn register_source(&mut self, source: Box<dyn SampleSource>) -> Result<()> {
        let source_id = source.source_id().to_string();
        if self.sources.contains_key(&source_id) {
            return Err(IngestionError::AlreadyRegistered { source_id });
        }
        debug!("registered sample source");
        self.sources.insert(source_id, source);
        Ok(())
    }

    /// Start all registered sources, forwarding batches to `sink`
    #[instrument(name = "ingestion_start_all", skip(self, sink))]
    pub fn start_all(&self, sink: SampleCallback) {
        info!(count = self.sources.len(), "starting all sample sources");
        let metrics = self.metrics.clone();
        let forward: SampleCallback = Arc::new(move |batch: Vec<Sample>| {
            let bad = batch.iter().filter(|s| !s.timestamp_quality_good).count();
            metrics.record_batch(batch.len(), bad);
            counter!("ingestion_samples_total").increment(batch.len() as u64);
            if bad > 0 {
                counter!("ingestion_bad_timestamps_total").increment(bad as u64);
            }
            sink(batch);
        });

        for (source_id, source) in &self.sources {
            if !source.is_listening() {
                debug!(source_id = %source_id, "starting source");
                source.listen(forward.clone());
            }
        }
    }

    /// Stop all sources
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        info!(count = self.sources.len(), "stopping all sample sources");
        for (source_id, source) in &self.sources {
            if source.is_listening() {
                debug!(source_id = %source_id, "stopping source");
                source.stop();
            }
        }
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Get registered source count
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Check if specified source is listening
    pub fn is_source_listening(&self, source_id: &str) -> bool {
        self.sources
            .get(source_id)
            .map(|s| s.is_listening())
            .unwrap_or(false)
    }
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSampleSource;
    use contracts::{ManualClock, SourceConfig, Ticks};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    fn mock(id: &str, bad_timestamp_ratio: f64) -> Box<dyn SampleSource> {
        let config = SourceConfig {
            bad_timestamp_ratio,
            ..SourceConfig::new(id, 3, 100.0)
        };
        let clock = Arc::new(ManualClock::new(Ticks::new(638_000_000_000_000_000)));
        Box::new(MockSampleSource::with_clock(config, clock).unwrap())
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = IngestionPipeline::new();
        assert_eq!(pipeline.source_count(), 0);
        assert!(!pipeline.is_source_listening("PMU_A"));
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let mut pipeline = IngestionPipeline::new();
        pipeline.register_source(mock("PMU_A", 0.0)).unwrap();
        let err = pipeline.register_source(mock("PMU_A", 0.0)).unwrap_err();
        assert!(matches!(err, IngestionError::AlreadyRegistered { .. }));
        assert_eq!(pipeline.source_count(), 1);
    }

    #[test]
    fn test_start_forwards_and_counts() {
        let mut pipeline = IngestionPipeline::new();
        pipeline.register_source(mock("PMU_A", 0.0)).unwrap();
        pipeline.register_source(mock("PMU_B", 1.0)).unwrap();

        let received = Arc::new(AtomicUsize::new(0));
        let sources = Arc::new(Mutex::new(Vec::new()));
        let sink: SampleCallback = {
            let received = received.clone();
            let sources = sources.clone();
            Arc::new(move |batch: Vec<Sample>| {
                received.fetch_add(batch.len(), Ordering::Relaxed);
                if let Some(sample) = batch.first() {
                    sources.lock().unwrap().push(sample.key.source().to_string());
                }
            })
        };

        pipeline.start_all(sink);
        assert!(pipeline.is_source_listening("PMU_A"));
        assert!(pipeline.is_source_listening("PMU_B"));

        thread::sleep(Duration::from_millis(100));
        pipeline.stop_all();
        assert!(!pipeline.is_source_listening("PMU_A"));

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.samples_received as usize, received.load(Ordering::Relaxed));
        assert_eq!(snapshot.samples_received, snapshot.batches_received * 3);
        assert!(snapshot.bad_timestamps > 0);

        let sources = sources.lock().unwrap();
        assert!(sources.iter().any(|s| s == "PMU_A"));
        assert!(sources.iter().any(|s| s == "PMU_B"));
    }
}
