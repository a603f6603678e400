//! Publication metrics module
//!
//! Exports concentrator statistics as Prometheus gauges and aggregates
//! per-frame publication figures in memory for end-of-run summaries.

use std::collections::BTreeMap;

use contracts::{Frame, StatisticsSnapshot, Ticks};
use metrics::{counter, gauge, histogram};

/// Record a statistics snapshot as gauges
///
/// Counters inside the concentrator are already exported as they happen;
/// this adds the derived ratios, which only exist on a snapshot.
pub fn record_statistics(stats: &StatisticsSnapshot) {
    gauge!("concentrator_loss_ratio").set(stats.loss_ratio());
    gauge!("concentrator_timeout_loss_ratio").set(stats.timeout_loss_ratio());
    gauge!("concentrator_measurement_time_accuracy").set(stats.measurement_time_accuracy());
    gauge!("concentrator_downsampling_application").set(stats.downsampling_application());
    gauge!("concentrator_mean_frame_rate").set(stats.mean_frame_rate());
    gauge!("concentrator_average_publication_time_ms").set(stats.average_publication_time_ms());
    gauge!("concentrator_run_time_seconds").set(stats.run_time);

    if let Some(timestamp) = stats.last_published_timestamp {
        gauge!("concentrator_last_published_seconds").set(timestamp.to_seconds());
    }
}

/// Record one frame as seen by a publisher
///
/// `latency_ms` is the delay between the frame timestamp and the moment
/// the publisher received it.
pub fn record_frame_received(publisher: &str, frame: &Frame, latency_ms: f64) {
    counter!(
        "publisher_frames_total",
        "publisher" => publisher.to_string()
    )
    .increment(1);
    histogram!(
        "publisher_frame_samples",
        "publisher" => publisher.to_string()
    )
    .record(frame.len() as f64);
    histogram!(
        "publisher_frame_latency_ms",
        "publisher" => publisher.to_string()
    )
    .record(latency_ms);

    if frame.is_empty() {
        counter!(
            "publisher_empty_frames_total",
            "publisher" => publisher.to_string()
        )
        .increment(1);
    }
}

/// Publication metrics aggregator
///
/// Aggregates per-frame figures in memory to print a summary.
#[derive(Debug, Clone, Default)]
pub struct PublicationAggregator {
    /// Total frames seen
    pub total_frames: u64,

    /// Frames that carried no samples
    pub empty_frames: u64,

    /// Frames whose timestamp did not move forward
    pub out_of_order_frames: u64,

    /// Samples per frame statistics
    pub sample_stats: RunningStats,

    /// Frame latency statistics (ms)
    pub latency_stats: RunningStats,

    /// Frames seen per frame index
    pub index_counts: BTreeMap<u32, u64>,

    last_timestamp: Option<Ticks>,
}

impl PublicationAggregator {
    /// Create new aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Update aggregated statistics
    pub fn update(&mut self, frame: &Frame, index: u32, latency_ms: f64) {
        self.total_frames += 1;
        if frame.is_empty() {
            self.empty_frames += 1;
        }
        if self
            .last_timestamp
            .is_some_and(|last| frame.timestamp <= last)
        {
            self.out_of_order_frames += 1;
        }
        self.last_timestamp = Some(frame.timestamp);

        self.sample_stats.push(frame.len() as f64);
        self.latency_stats.push(latency_ms);
        *self.index_counts.entry(index).or_insert(0) += 1;
    }

    /// Generate summary report
    pub fn summary(&self) -> PublicationSummary {
        PublicationSummary {
            total_frames: self.total_frames,
            empty_frames: self.empty_frames,
            out_of_order_frames: self.out_of_order_frames,
            empty_rate: if self.total_frames > 0 {
                self.empty_frames as f64 / self.total_frames as f64 * 100.0
            } else {
                0.0
            },
            samples_per_frame: StatsSummary::from(&self.sample_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
            distinct_indexes: self.index_counts.len(),
        }
    }

    /// Reset statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Publication summary
#[derive(Debug, Clone, Default)]
pub struct PublicationSummary {
    pub total_frames: u64,
    pub empty_frames: u64,
    pub out_of_order_frames: u64,
    pub empty_rate: f64,
    pub samples_per_frame: StatsSummary,
    pub latency_ms: StatsSummary,
    pub distinct_indexes: usize,
}

impl std::fmt::Display for PublicationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Publication Summary ===")?;
        writeln!(f, "Total frames: {}", self.total_frames)?;
        writeln!(
            f,
            "Empty frames: {} ({:.2}%)",
            self.empty_frames, self.empty_rate
        )?;
        writeln!(f, "Out-of-order frames: {}", self.out_of_order_frames)?;
        writeln!(f, "Distinct frame indexes: {}", self.distinct_indexes)?;
        writeln!(f, "Samples per frame: {}", self.samples_per_frame)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a value
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
