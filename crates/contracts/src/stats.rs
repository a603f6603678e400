//! Point-in-time concentrator statistics

use serde::Serialize;
use std::time::Duration;

use crate::{Sample, Ticks};

/// Copy of the running statistics of one concentrator.
///
/// Counters are reset on every start; ratios are derived on demand.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatisticsSnapshot {
    /// Samples offered to `sort`
    pub received: u64,
    /// Samples successfully assigned to a frame
    pub processed: u64,
    pub discarded: u64,
    pub sorted_by_arrival: u64,
    pub missed_sorts_by_timeout: u64,
    pub published_frames: u64,
    pub published_samples: u64,
    pub frames_ahead_of_schedule: u64,
    /// Samples merged into an identity already present in their frame
    pub downsampled: u64,

    /// Cumulative time spent inside the publish callback
    pub total_publish_time: Duration,

    /// Seconds since start (or total run time once stopped)
    pub run_time: f64,

    /// Lag time in effect when the snapshot was taken
    pub lag_time: f64,

    pub last_discarded: Option<Sample>,
    /// Real time minus the timestamp of `last_discarded`, seconds
    pub last_discarded_latency: f64,

    pub last_published_timestamp: Option<Ticks>,
    /// Last sample sorted into the most recently published frame
    pub last_published_sample: Option<Sample>,
}

impl StatisticsSnapshot {
    /// Average time spent per published frame, milliseconds.
    pub fn average_publication_time_ms(&self) -> f64 {
        if self.published_frames == 0 {
            return 0.0;
        }
        self.total_publish_time.as_secs_f64() * 1000.0 / self.published_frames as f64
    }

    /// Mean published frames per second, discounting the initial lag.
    pub fn mean_frame_rate(&self) -> f64 {
        let effective = self.run_time - self.lag_time;
        if effective <= 0.0 {
            return 0.0;
        }
        self.published_frames as f64 / effective
    }

    /// `discarded / received`
    pub fn loss_ratio(&self) -> f64 {
        ratio(self.discarded, self.received)
    }

    /// `missed_sorts_by_timeout / processed`
    pub fn timeout_loss_ratio(&self) -> f64 {
        ratio(self.missed_sorts_by_timeout, self.processed)
    }

    /// `downsampled / processed`
    pub fn downsampling_application(&self) -> f64 {
        ratio(self.downsampled, self.processed)
    }

    /// Share of received samples sorted by their own timestamp.
    pub fn measurement_time_accuracy(&self) -> f64 {
        if self.received == 0 {
            return 1.0;
        }
        1.0 - ratio(self.sorted_by_arrival, self.received)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
