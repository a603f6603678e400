//! Mock sample source
//!
//! Implements `SampleSource`, emitting synthetic phasor-style readings from
//! a background thread. Used for testing and demos without real devices.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    Clock, Sample, SampleCallback, SampleKey, SampleSource, SourceConfig, SystemClock, Ticks,
};
use rand::Rng;
use tracing::{debug, error, trace};
use validator::Validate;

use crate::error::{IngestionError, Result};

/// Signal names used for the first readings of every source.
const SIGNAL_NAMES: &[&str] = &["FREQ", "DFDT", "VPHM", "VPHA", "IPHM", "IPHA"];

/// Mock sample source
///
/// Each reading is stamped on the source's rate grid within the current
/// second, then shifted by the configured clock offset and random jitter.
pub struct MockSampleSource {
    generator: Arc<SignalGenerator>,
    clock: Arc<dyn Clock>,
    listening: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Reading generator shared with the producer thread
#[derive(Debug)]
struct SignalGenerator {
    config: SourceConfig,
    keys: Vec<SampleKey>,
}

impl MockSampleSource {
    /// Create a mock source reading the system clock
    pub fn new(config: SourceConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a mock source reading an explicit clock
    pub fn with_clock(config: SourceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config
            .validate()
            .map_err(|err| IngestionError::InvalidSource {
                source_id: config.id.clone(),
                message: err.to_string(),
            })?;

        let keys = (0..config.signals)
            .map(|i| match SIGNAL_NAMES.get(i) {
                Some(name) => SampleKey::from_parts(&config.id, name),
                None => {
                    let analog = i - SIGNAL_NAMES.len() + 1;
                    SampleKey::from_parts(&config.id, &format!("ANALOG{analog}"))
                }
            })
            .collect();

        Ok(Self {
            generator: Arc::new(SignalGenerator { config, keys }),
            clock,
            listening: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.generator.config
    }

    /// Keys of the signals this source reports, in reading order
    pub fn keys(&self) -> &[SampleKey] {
        &self.generator.keys
    }

    /// Latest rate-grid point at or before `now`
    pub fn aligned_timestamp(&self, now: Ticks) -> Ticks {
        self.generator.aligned_timestamp(now)
    }

    /// Generate one reading: a sample for every signal, sharing a timestamp
    pub fn reading(&self, now: Ticks, sequence: u64, rng: &mut impl Rng) -> Vec<Sample> {
        self.generator.reading(now, sequence, rng)
    }
}

impl SignalGenerator {
    /// Ticks between two readings (fractional)
    fn period_ticks(&self) -> f64 {
        Ticks::PER_SECOND as f64 / self.config.rate_hz
    }

    fn aligned_timestamp(&self, now: Ticks) -> Ticks {
        let period = self.period_ticks();
        let beyond = now.distance_beyond_second();
        let slot = (beyond as f64 / period).floor();
        let mut offset = (slot * period).round() as i64;
        // Rounding can overshoot `now` by a fraction of a tick.
        if offset > beyond {
            offset = ((slot - 1.0).max(0.0) * period).round() as i64;
        }
        Ticks::new(now.base_of_second().value() + offset)
    }

    fn reading(&self, now: Ticks, sequence: u64, rng: &mut impl Rng) -> Vec<Sample> {
        let config = &self.config;
        let mut timestamp = self.aligned_timestamp(now)
            + Ticks::new((config.clock_offset_ms * Ticks::PER_MILLISECOND as f64).round() as i64);
        if config.jitter_ms > 0.0 {
            let jitter = rng.random_range(-config.jitter_ms..=config.jitter_ms);
            timestamp = timestamp + Ticks::new((jitter * Ticks::PER_MILLISECOND as f64).round() as i64);
        }

        let timestamp_good = !rng.random_bool(config.bad_timestamp_ratio);
        let phase = 2.0 * PI * sequence as f64 / config.rate_hz;

        self.keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                Sample::new(key.clone(), timestamp, signal_value(i, phase))
                    .with_timestamp_quality(timestamp_good)
            })
            .collect()
    }
}

/// Synthetic value for signal `index` at `phase` radians
fn signal_value(index: usize, phase: f64) -> f64 {
    match index {
        0 => 60.0 + 0.02 * phase.sin(),
        1 => 0.02 * phase.cos(),
        2 => 1.0 + 0.01 * (phase * 0.5).sin(),
        3 => (phase * 0.1).rem_euclid(2.0 * PI) - PI,
        4 => 0.8 + 0.05 * (phase * 0.25).sin(),
        5 => (phase * 0.1 - PI / 6.0).rem_euclid(2.0 * PI) - PI,
        n => (phase + n as f64).sin(),
    }
}

impl SampleSource for MockSampleSource {
    fn source_id(&self) -> &str {
        &self.generator.config.id
    }

    fn listen(&self, callback: SampleCallback) {
        // Idempotent: if already listening, don't start again
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let generator = self.generator.clone();
        let clock = self.clock.clone();
        let listening = self.listening.clone();
        let interval = Duration::from_secs_f64(1.0 / generator.config.rate_hz);

        let spawned = thread::Builder::new()
            .name(format!("source-{}", generator.config.id))
            .spawn(move || {
                let mut rng = rand::rng();
                let mut sequence: u64 = 0;
                let mut deadline = Instant::now();
                let source_id = generator.config.id.as_str();

                debug!(
                    source_id,
                    signals = generator.keys.len(),
                    rate_hz = generator.config.rate_hz,
                    "mock source started"
                );

                while listening.load(Ordering::Relaxed) {
                    let batch = generator.reading(clock.now(), sequence, &mut rng);
                    trace!(
                        source_id,
                        sequence,
                        timestamp = batch.first().map(|s| s.timestamp.value()),
                        "mock reading sent"
                    );
                    callback(batch);
                    sequence += 1;

                    deadline += interval;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                }

                debug!(source_id, sequence, "mock source stopped");
            });

        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(err) => {
                self.listening.store(false, Ordering::SeqCst);
                error!(source_id = self.source_id(), error = %err, "failed to spawn mock source");
            }
        }
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!(source_id = self.source_id(), "mock source thread panicked");
            }
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

impl Drop for MockSampleSource {
    fn drop(&mut self) {
        self.stop();
    }
}
