//! Running statistics for one concentrator run
//!
//! Hot counters are atomics; the rarely written diagnostics share a mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{Frame, Sample, StatisticsSnapshot, Ticks};

#[derive(Debug, Default)]
struct Diagnostics {
    started: Option<Instant>,
    stopped: Option<Instant>,
    last_discarded: Option<Sample>,
    last_discarded_latency: f64,
    last_published_timestamp: Option<Ticks>,
    last_published_sample: Option<Sample>,
}

#[derive(Debug, Default)]
pub(crate) struct Statistics {
    received: AtomicU64,
    processed: AtomicU64,
    discarded: AtomicU64,
    sorted_by_arrival: AtomicU64,
    missed_sorts_by_timeout: AtomicU64,
    published_frames: AtomicU64,
    published_samples: AtomicU64,
    frames_ahead_of_schedule: AtomicU64,
    downsampled: AtomicU64,
    publish_nanos: AtomicU64,
    diagnostics: Mutex<Diagnostics>,
}

impl Statistics {
    fn diagnostics(&self) -> MutexGuard<'_, Diagnostics> {
        self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_received(&self, count: u64) {
        self.received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sorted_by_arrival(&self) {
        self.sorted_by_arrival.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_missed_sort(&self) {
        self.missed_sorts_by_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ahead_of_schedule(&self) {
        self.frames_ahead_of_schedule.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a discard and keeps it as the latest one.
    pub fn record_discard(&self, sample: &Sample, real_time: Ticks) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        let mut diagnostics = self.diagnostics();
        diagnostics.last_discarded_latency = (real_time - sample.timestamp).to_seconds();
        diagnostics.last_discarded = Some(sample.clone());
    }

    pub fn record_published(&self, frame: &Frame, elapsed: Duration) {
        self.published_frames.fetch_add(1, Ordering::Relaxed);
        self.published_samples
            .fetch_add(frame.sorted_count as u64, Ordering::Relaxed);
        self.downsampled
            .fetch_add(frame.downsampled_count as u64, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.publish_nanos.fetch_add(nanos, Ordering::Relaxed);

        let mut diagnostics = self.diagnostics();
        diagnostics.last_published_timestamp = Some(frame.timestamp);
        diagnostics.last_published_sample = frame.last_sorted.clone();
    }

    pub fn mark_started(&self) {
        let mut diagnostics = self.diagnostics();
        diagnostics.started = Some(Instant::now());
        diagnostics.stopped = None;
    }

    pub fn mark_stopped(&self) {
        self.diagnostics().stopped = Some(Instant::now());
    }

    /// Zeroes every counter and diagnostic, keeping the run markers.
    pub fn reset(&self) {
        for counter in [
            &self.received,
            &self.processed,
            &self.discarded,
            &self.sorted_by_arrival,
            &self.missed_sorts_by_timeout,
            &self.published_frames,
            &self.published_samples,
            &self.frames_ahead_of_schedule,
            &self.downsampled,
            &self.publish_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }

        let mut diagnostics = self.diagnostics();
        diagnostics.last_discarded = None;
        diagnostics.last_discarded_latency = 0.0;
        diagnostics.last_published_timestamp = None;
        diagnostics.last_published_sample = None;
    }

    /// Seconds since start, frozen once stopped.
    pub fn run_time(&self) -> f64 {
        let diagnostics = self.diagnostics();
        match diagnostics.started {
            Some(started) => diagnostics
                .stopped
                .unwrap_or_else(Instant::now)
                .saturating_duration_since(started)
                .as_secs_f64(),
            None => 0.0,
        }
    }

    pub fn snapshot(&self, lag_time: f64) -> StatisticsSnapshot {
        let run_time = self.run_time();
        let diagnostics = self.diagnostics();
        StatisticsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            sorted_by_arrival: self.sorted_by_arrival.load(Ordering::Relaxed),
            missed_sorts_by_timeout: self.missed_sorts_by_timeout.load(Ordering::Relaxed),
            published_frames: self.published_frames.load(Ordering::Relaxed),
            published_samples: self.published_samples.load(Ordering::Relaxed),
            frames_ahead_of_schedule: self.frames_ahead_of_schedule.load(Ordering::Relaxed),
            downsampled: self.downsampled.load(Ordering::Relaxed),
            total_publish_time: Duration::from_nanos(self.publish_nanos.load(Ordering::Relaxed)),
            run_time,
            lag_time,
            last_discarded: diagnostics.last_discarded.clone(),
            last_discarded_latency: diagnostics.last_discarded_latency,
            last_published_timestamp: diagnostics.last_published_timestamp,
            last_published_sample: diagnostics.last_published_sample.clone(),
        }
    }
}
