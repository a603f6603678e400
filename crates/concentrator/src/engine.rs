//! Concentrator - sorts samples into frames and publishes them on schedule

use std::any::Any;
use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    clamp_time_resolution, validate_frames_per_second, validate_tolerance, Clock,
    ConcentratorConfig, ConcentratorEvent, ContractError, DownsamplingMethod, EventCallback, Frame,
    FramePublisher, Sample, SampleKey, StatisticsSnapshot, SystemClock, Ticks,
};
use metrics::{counter, gauge, histogram};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::frame::TrackingFrame;
use crate::frame_queue::{FrameQueue, QueuedFrame};
use crate::latest::LatestValues;
use crate::real_time::{RealTimeEstimator, RealTimePolicy};
use crate::statistics::Statistics;
use crate::strategy::{DefaultFrameStrategy, FrameStrategy};
use crate::timer::{frame_periods, FrameRateTimer, ShutdownSignal};

const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
const PUBLISHER_THREAD: &str = "concentrator-publisher";
const MONITOR_THREAD: &str = "concentrator-monitor";

/// Builder for [`Concentrator`]
pub struct ConcentratorBuilder {
    config: ConcentratorConfig,
    publisher: Option<Box<dyn FramePublisher>>,
    clock: Arc<dyn Clock>,
    strategy: Arc<dyn FrameStrategy>,
    on_event: Option<EventCallback>,
}

impl ConcentratorBuilder {
    pub fn new(config: ConcentratorConfig) -> Self {
        Self {
            config,
            publisher: None,
            clock: Arc::new(SystemClock),
            strategy: Arc::new(DefaultFrameStrategy),
            on_event: None,
        }
    }

    /// Frame consumer (required)
    pub fn publisher(mut self, publisher: impl FramePublisher + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    /// Local clock, [`SystemClock`] by default
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn strategy(mut self, strategy: impl FrameStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    /// Notification callback; runs on concentrator threads and must not block
    pub fn on_event(mut self, callback: impl Fn(ConcentratorEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(callback));
        self
    }

    /// Validates the configuration and builds a stopped concentrator.
    pub fn build(self) -> Result<Concentrator, ContractError> {
        let mut config = self.config;
        config.validate()?;

        let publisher = self
            .publisher
            .ok_or_else(|| ContractError::config_validation("publisher", "a frame publisher is required"))?;
        let publisher_name = publisher.name().to_string();

        let queue = FrameQueue::new(
            config.frames_per_second,
            config.time_resolution_ticks,
            self.strategy,
        );
        queue.set_round_to_nearest(config.round_to_nearest_timestamp);

        let inner = Inner {
            queue,
            frame_periods: RwLock::new(frame_periods(config.frames_per_second)),
            config: RwLock::new(config),
            enabled: AtomicBool::new(false),
            real_time: RealTimeEstimator::new(self.clock),
            statistics: Statistics::default(),
            latest: LatestValues::default(),
            publisher: Mutex::new(publisher),
            publisher_name,
            on_event: self.on_event,
            shutdown: ShutdownSignal::default(),
            workers: Mutex::new(Vec::new()),
        };

        Ok(Concentrator {
            inner: Arc::new(inner),
        })
    }
}

struct Inner {
    config: RwLock<ConcentratorConfig>,
    frame_periods: RwLock<Vec<u32>>,
    enabled: AtomicBool,
    queue: FrameQueue,
    real_time: RealTimeEstimator,
    statistics: Statistics,
    latest: LatestValues,
    publisher: Mutex<Box<dyn FramePublisher>>,
    publisher_name: String,
    on_event: Option<EventCallback>,
    shutdown: ShutdownSignal,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Real-time measurement concentrator
///
/// Producers call [`Concentrator::sort`] from any number of threads while a
/// dedicated publication thread hands completed frames to the
/// [`FramePublisher`] in strictly ascending timestamp order. Share it
/// between producers as `Arc<Concentrator>`.
///
/// Dropping the concentrator stops it.
pub struct Concentrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Concentrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Concentrator")
            .field("publisher", &self.inner.publisher_name)
            .field("enabled", &self.is_enabled())
            .field("config", &self.config())
            .field("queued_frames", &self.inner.queue.len())
            .field("last_published", &self.inner.queue.last_published())
            .finish()
    }
}

impl Concentrator {
    pub fn builder(config: ConcentratorConfig) -> ConcentratorBuilder {
        ConcentratorBuilder::new(config)
    }

    // ===== Lifecycle =====

    /// Starts the publication and monitor threads.
    ///
    /// Resets statistics and clears the frame queue. Starting a running
    /// concentrator does nothing.
    #[instrument(level = "debug", name = "concentrator_start", skip(self), fields(publisher = %self.inner.publisher_name))]
    pub fn start(&self) -> Result<(), ContractError> {
        let inner = &self.inner;
        let mut workers = inner.workers();
        if inner.enabled.load(Ordering::Acquire) {
            return Ok(());
        }

        inner.statistics.reset();
        inner.statistics.mark_started();
        inner.queue.clear();
        inner.real_time.reset();
        inner.shutdown.reset();
        inner.enabled.store(true, Ordering::Release);

        let spawned = spawn_worker(PUBLISHER_THREAD, inner, Inner::publish_loop).and_then(|publisher| {
            workers.push(publisher);
            spawn_worker(MONITOR_THREAD, inner, Inner::monitor_loop)
        });

        match spawned {
            Ok(monitor) => workers.push(monitor),
            Err(err) => {
                inner.enabled.store(false, Ordering::Release);
                inner.shutdown.trigger();
                for handle in workers.drain(..) {
                    let _ = handle.join();
                }
                error!(error = %err, "failed to spawn concentrator threads");
                return Err(err.into());
            }
        }

        let config = inner.config();
        info!(
            frames_per_second = config.frames_per_second,
            lag_time = config.lag_time,
            lead_time = config.lead_time,
            "concentrator started"
        );
        Ok(())
    }

    /// Stops publication and clears the frame queue.
    ///
    /// A publish callback already running is allowed to finish first.
    #[instrument(level = "debug", name = "concentrator_stop", skip(self), fields(publisher = %self.inner.publisher_name))]
    pub fn stop(&self) {
        let inner = &self.inner;
        let handles = {
            let mut workers = inner.workers();
            let was_enabled = inner.enabled.swap(false, Ordering::AcqRel);
            if !was_enabled && workers.is_empty() {
                return;
            }
            mem::take(&mut *workers)
        };

        inner.shutdown.trigger();

        // A callback may stop the concentrator from one of its own threads.
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "concentrator thread panicked");
            }
        }

        inner.queue.clear();
        inner.statistics.mark_stopped();

        let stats = inner.statistics.snapshot(inner.config().lag_time);
        info!(
            published_frames = stats.published_frames,
            received = stats.received,
            discarded = stats.discarded,
            "concentrator stopped"
        );
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Starts or stops the concentrator.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), ContractError> {
        if enabled {
            self.start()
        } else {
            self.stop();
            Ok(())
        }
    }

    // ===== Ingestion =====

    /// Sorts a batch of samples into their frames.
    ///
    /// Never fails: rejected samples are counted and reported through a
    /// single [`ConcentratorEvent::DiscardingSamples`] per call.
    #[instrument(level = "trace", name = "concentrator_sort", skip_all, fields(count = samples.len()))]
    pub fn sort(&self, samples: Vec<Sample>) {
        self.inner.sort(samples);
    }

    /// Sorts a single sample.
    pub fn sort_sample(&self, sample: Sample) {
        self.inner.sort(vec![sample]);
    }

    // ===== Time =====

    /// Best estimate of the current time.
    pub fn real_time(&self) -> Ticks {
        self.inner.real_time()
    }

    /// Seconds between real time and `timestamp` (positive = in the past).
    ///
    /// Without the reasonability check an unseeded estimate starts at
    /// `timestamp`.
    pub fn seconds_from_real_time(&self, timestamp: Ticks) -> f64 {
        let policy = RealTimePolicy::from(&self.config());
        (self.inner.real_time.seed_or_current(timestamp, policy) - timestamp).to_seconds()
    }

    // ===== Configuration =====

    /// Copy of the current configuration.
    pub fn config(&self) -> ConcentratorConfig {
        self.inner.config()
    }

    pub fn set_frames_per_second(&self, frames_per_second: u32) -> Result<(), ContractError> {
        validate_frames_per_second(frames_per_second)?;
        let mut config = self.inner.config_mut();
        if config.frames_per_second == frames_per_second {
            return Ok(());
        }
        config.frames_per_second = frames_per_second;
        self.inner.queue.set_frames_per_second(frames_per_second);
        *self
            .inner
            .frame_periods
            .write()
            .unwrap_or_else(PoisonError::into_inner) = frame_periods(frames_per_second);
        debug!(frames_per_second, "frame rate changed");
        Ok(())
    }

    pub fn set_lag_time(&self, seconds: f64) -> Result<(), ContractError> {
        validate_tolerance("lag_time", seconds)?;
        self.inner.config_mut().lag_time = seconds;
        Ok(())
    }

    pub fn set_lead_time(&self, seconds: f64) -> Result<(), ContractError> {
        validate_tolerance("lead_time", seconds)?;
        self.inner.config_mut().lead_time = seconds;
        Ok(())
    }

    /// Sets the sorting resolution, clamped into `0..=Ticks::PER_SECOND`.
    pub fn set_time_resolution(&self, ticks: i64) {
        let ticks = clamp_time_resolution(ticks);
        let mut config = self.inner.config_mut();
        config.time_resolution_ticks = ticks;
        self.inner.queue.set_time_resolution(ticks);
    }

    /// Ignored while processing by received timestamp, which keeps arrival
    /// sorting off.
    pub fn set_allow_sorts_by_arrival(&self, allow: bool) {
        let mut config = self.inner.config_mut();
        config.allow_sorts_by_arrival = allow && !config.process_by_received_timestamp;
    }

    /// Ignored while processing by received timestamp, which keeps the local
    /// clock as real time.
    pub fn set_use_local_clock_as_real_time(&self, use_local_clock: bool) {
        let mut config = self.inner.config_mut();
        config.use_local_clock_as_real_time = use_local_clock || config.process_by_received_timestamp;
    }

    /// Switching on forces the local clock as real time and disables
    /// arrival sorting; switching off leaves both as they are.
    pub fn set_process_by_received_timestamp(&self, enabled: bool) {
        let mut config = self.inner.config_mut();
        config.process_by_received_timestamp = enabled;
        if enabled {
            config.use_local_clock_as_real_time = true;
            config.allow_sorts_by_arrival = false;
        }
    }

    pub fn set_downsampling_method(&self, method: DownsamplingMethod) {
        self.inner.config_mut().downsampling_method = method;
    }

    pub fn set_round_to_nearest_timestamp(&self, round_to_nearest: bool) {
        let mut config = self.inner.config_mut();
        config.round_to_nearest_timestamp = round_to_nearest;
        self.inner.queue.set_round_to_nearest(round_to_nearest);
    }

    /// Turning tracking off also forgets the tracked values.
    pub fn set_track_latest_values(&self, track: bool) {
        self.inner.config_mut().track_latest_values = track;
        if !track {
            self.inner.latest.clear();
        }
    }

    pub fn set_ignore_bad_timestamps(&self, ignore: bool) {
        self.inner.config_mut().ignore_bad_timestamps = ignore;
    }

    pub fn set_perform_timestamp_reasonability_check(&self, check: bool) {
        self.inner.config_mut().perform_timestamp_reasonability_check = check;
    }

    pub fn set_allow_preemptive_publishing(&self, allow: bool) {
        self.inner.config_mut().allow_preemptive_publishing = allow;
    }

    pub fn set_expected_samples(&self, expected: usize) {
        self.inner.config_mut().expected_samples = expected;
    }

    /// Per-frame timer waits in milliseconds; they sum to 1000.
    pub fn frame_periods(&self) -> Vec<u32> {
        self.inner
            .frame_periods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ideal frame spacing in ticks.
    pub fn ticks_per_frame(&self) -> f64 {
        self.inner.queue.ticks_per_frame()
    }

    // ===== Diagnostics =====

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.inner.statistics.reset();
    }

    /// Pending frames, earliest first.
    pub fn queue_state(&self) -> Vec<QueuedFrame> {
        self.inner.queue.snapshot()
    }

    pub fn queued_frames(&self) -> usize {
        self.inner.queue.len()
    }

    /// Latest sample seen for `key`, when value tracking is on.
    pub fn latest_value(&self, key: &str) -> Option<Sample> {
        self.inner.latest.get(key)
    }

    pub fn latest_values(&self) -> HashMap<SampleKey, Sample> {
        self.inner.latest.snapshot()
    }

    pub fn publisher_name(&self) -> &str {
        &self.inner.publisher_name
    }

    /// Whole seconds of backlog beyond the second being accumulated.
    pub fn unpublished_seconds(&self) -> usize {
        self.inner.unpublished_seconds()
    }
}

impl Drop for Concentrator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_worker(
    name: &str,
    inner: &Arc<Inner>,
    work: fn(&Inner),
) -> Result<JoinHandle<()>, std::io::Error> {
    let inner = inner.clone();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || work(&inner))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl Inner {
    fn config(&self) -> ConcentratorConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn config_mut(&self) -> std::sync::RwLockWriteGuard<'_, ConcentratorConfig> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn real_time(&self) -> Ticks {
        self.real_time.current(RealTimePolicy::from(&self.config()))
    }

    fn snapshot(&self) -> StatisticsSnapshot {
        self.statistics.snapshot(self.config().lag_time)
    }

    fn sort(&self, samples: Vec<Sample>) {
        if !self.enabled.load(Ordering::Acquire) || samples.is_empty() {
            return;
        }

        let config = self.config();
        let policy = RealTimePolicy::from(&config);
        let lag = config.lag_ticks().value();
        let lead = config.lead_ticks().value();
        let sort_by_arrival = config.sorts_by_arrival();

        let received = samples.len() as u64;
        self.statistics.add_received(received);
        counter!("concentrator_samples_received_total").increment(received);

        let mut discarded = Vec::new();
        let mut last_frame: Option<(Ticks, Arc<TrackingFrame>)> = None;

        for sample in samples {
            let trusted = sample.timestamp_quality_good || config.ignore_bad_timestamps;

            let (timestamp, real_time) = if trusted {
                let real_time = self.real_time.seed_or_current(sample.timestamp, policy);
                (sample.timestamp, real_time)
            } else if sort_by_arrival {
                self.statistics.inc_sorted_by_arrival();
                let real_time = self.real_time.current(policy);
                (real_time, real_time)
            } else {
                let real_time = self.real_time.current(policy);
                self.discard(sample, real_time, "bad timestamp quality", &mut discarded);
                continue;
            };

            if config.track_latest_values {
                self.latest.update(&sample);
            }

            // Frames age from their creation instead when sorting by
            // received time, so any timestamp is accepted.
            if !config.process_by_received_timestamp {
                let distance = (real_time - timestamp).value();
                if distance > lag {
                    self.discard(sample, real_time, "older than lag time", &mut discarded);
                    continue;
                }
                if config.perform_timestamp_reasonability_check && distance < -lead {
                    self.discard(sample, real_time, "beyond lead time", &mut discarded);
                    continue;
                }
            }

            let frame = match &last_frame {
                Some((cached, frame)) if *cached == timestamp => Some(frame.clone()),
                _ => self.queue.get_frame(timestamp, real_time),
            };
            let Some(frame) = frame else {
                self.discard(sample, real_time, "frame already published", &mut discarded);
                continue;
            };

            let original = sample.timestamp;
            match frame.try_assign(sample, self.queue.strategy(), config.downsampling_method) {
                Ok(()) => {
                    self.statistics.inc_processed();
                    if trusted {
                        self.real_time.advance(original, policy);
                    }
                }
                Err(sample) => {
                    self.statistics.inc_missed_sort();
                    counter!("concentrator_missed_sorts_total").increment(1);
                    self.discard(sample, real_time, "frame published during sort", &mut discarded);
                }
            }
            last_frame = Some((timestamp, frame));
        }

        if !discarded.is_empty() {
            counter!("concentrator_samples_discarded_total").increment(discarded.len() as u64);
            self.emit(ConcentratorEvent::DiscardingSamples(discarded));
        }
    }

    fn discard(&self, sample: Sample, real_time: Ticks, reason: &'static str, discarded: &mut Vec<Sample>) {
        trace!(
            key = %sample.key,
            timestamp = sample.timestamp.value(),
            reason,
            "discarding sample"
        );
        self.statistics.record_discard(&sample, real_time);
        discarded.push(sample);
    }

    fn publish_loop(&self) {
        let mut frames_per_second = self.config().frames_per_second;
        let mut timer = FrameRateTimer::new(frames_per_second, Instant::now());
        debug!(frames_per_second, "publication thread running");

        loop {
            let deadline = timer.next_deadline(Instant::now());
            if self.shutdown.wait_until(deadline) {
                break;
            }

            let config = self.config();
            if config.frames_per_second != frames_per_second {
                frames_per_second = config.frames_per_second;
                timer.set_frame_rate(frames_per_second);
            }

            self.publish_due_frames(&config);
        }

        debug!("publication thread exiting");
    }

    /// Publishes every frame whose lag time has elapsed, earliest first.
    ///
    /// A frame's age runs from its timestamp, or from its creation when
    /// processing by received timestamp.
    fn publish_due_frames(&self, config: &ConcentratorConfig) {
        let lag = config.lag_ticks().value();
        let policy = RealTimePolicy::from(config);
        let by_received = config.process_by_received_timestamp;

        while let Some(head) = self.queue.head() {
            if !self.enabled.load(Ordering::Acquire) {
                break;
            }

            let since = if by_received {
                head.created()
            } else {
                head.timestamp()
            };
            let age = (self.real_time.current(policy) - since).value();
            let mut ahead_of_schedule = false;
            if lag - age > 0 {
                // Down-sampled repeats count toward the expected samples.
                let complete = !by_received
                    && config.allow_preemptive_publishing
                    && config.expected_samples > 0
                    && head.sorted_count() >= config.expected_samples;
                if !complete {
                    break;
                }
                ahead_of_schedule = true;
            }

            // An earlier frame may have been queued since `head` was read.
            if !self.queue.begin_publish(&head) {
                continue;
            }

            if ahead_of_schedule {
                self.statistics.inc_ahead_of_schedule();
            }

            let frame = head.publish();
            let index = self.queue.frame_index(frame.timestamp);
            self.deliver(&frame, index);
            self.queue.pop();
        }
    }

    fn deliver(&self, frame: &Frame, index: u32) {
        let started = Instant::now();
        let outcome = {
            let mut publisher = self.publisher.lock().unwrap_or_else(PoisonError::into_inner);
            panic::catch_unwind(AssertUnwindSafe(|| publisher.publish(frame, index)))
        };
        let elapsed = started.elapsed();

        self.statistics.record_published(frame, elapsed);
        counter!("concentrator_frames_published_total").increment(1);
        histogram!("concentrator_publish_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
        trace!(
            timestamp = frame.timestamp.value(),
            index,
            samples = frame.len(),
            "published frame"
        );

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.report_exception("publish", err.to_string()),
            Err(payload) => {
                let message = format!("publish callback panicked: {}", panic_message(&*payload));
                self.report_exception("publish", message);
            }
        }
    }

    fn monitor_loop(&self) {
        loop {
            if self.shutdown.wait_until(Instant::now() + MONITOR_INTERVAL) {
                break;
            }
            let seconds = self.unpublished_seconds();
            gauge!("concentrator_backlog_seconds").set(seconds as f64);
            if seconds > 0 {
                warn!(seconds, queued = self.queue.len(), "unpublished samples backing up");
            }
            self.emit(ConcentratorEvent::UnpublishedSamples { seconds });
        }
    }

    fn unpublished_seconds(&self) -> usize {
        let frames_per_second = self.config().frames_per_second as usize;
        (self.queue.len() / frames_per_second.max(1)).saturating_sub(1)
    }

    fn report_exception(&self, source: &str, message: String) {
        error!(publisher = %self.publisher_name, source, %message, "processing exception");
        self.emit(ConcentratorEvent::process_exception(source, message));
    }

    fn emit(&self, event: ConcentratorEvent) {
        counter!("concentrator_events_total", "kind" => event.kind()).increment(1);
        let Some(callback) = &self.on_event else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
            error!(message = %panic_message(&*payload), "event callback panicked");
        }
    }
}
