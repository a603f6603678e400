//! # Integration Tests
//!
//! Cross-crate integration and end-to-end tests.
//!
//! Covers:
//! - Contract snapshot checks
//! - End-to-end publication scenarios (manual and system clocks)
//! - Ordering and exactly-once delivery under concurrent producers
//! - Configuration file to running concentrator

#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use concentrator::{Concentrator, ConcentratorConfig, Frame, SampleKey, Ticks};
    use contracts::{ContractError, ManualClock};

    pub const T0: i64 = 638_000_000_000_000_000;

    /// One published frame as seen by the test publisher
    #[derive(Debug, Clone)]
    pub struct Delivery {
        pub timestamp: Ticks,
        pub index: u32,
        pub keys: Vec<SampleKey>,
    }

    pub type Deliveries = Arc<Mutex<Vec<Delivery>>>;

    pub fn record(deliveries: &Deliveries, frame: &Frame, index: u32) {
        deliveries.lock().unwrap().push(Delivery {
            timestamp: frame.timestamp,
            index,
            keys: frame.samples.keys().cloned().collect(),
        });
    }

    /// Concentrator on a manual clock, recording every delivery
    pub fn manual_concentrator(
        config: ConcentratorConfig,
    ) -> (Arc<ManualClock>, Deliveries, Arc<Concentrator>) {
        let clock = Arc::new(ManualClock::new(Ticks::new(T0)));
        let deliveries: Deliveries = Arc::default();
        let sink = deliveries.clone();
        let concentrator = Concentrator::builder(config)
            .clock(clock.clone())
            .publisher(move |frame: &Frame, index: u32| {
                record(&sink, frame, index);
                Ok::<(), ContractError>(())
            })
            .build()
            .unwrap();
        concentrator.start().unwrap();
        (clock, deliveries, Arc::new(concentrator))
    }

    pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    /// Frame timestamps strictly increase and no key is delivered twice
    pub fn assert_ordered_once(deliveries: &[Delivery]) {
        for pair in deliveries.windows(2) {
            assert!(
                pair[0].timestamp < pair[1].timestamp,
                "frames out of order: {} then {}",
                pair[0].timestamp.value(),
                pair[1].timestamp.value()
            );
        }
        let mut seen = std::collections::HashSet::new();
        for delivery in deliveries {
            for key in &delivery.keys {
                assert!(
                    seen.insert((delivery.timestamp, key.clone())),
                    "{key} delivered twice at {}",
                    delivery.timestamp.value()
                );
            }
        }
    }
}

#[cfg(test)]
mod contract_tests {
    use contracts::{ConcentratorConfig, Sample, Ticks};

    #[test]
    fn test_default_configuration_snapshot() {
        let config = ConcentratorConfig::default();
        assert_eq!(config.frames_per_second, 30);
        assert_eq!(config.lag_time, 3.0);
        assert_eq!(config.lead_time, 1.0);
        assert_eq!(config.time_resolution_ticks, 0);
        assert!(config.allow_sorts_by_arrival);
        assert!(!config.use_local_clock_as_real_time);
        assert!(!config.track_latest_values);
    }

    #[test]
    fn test_sample_defaults() {
        let sample = Sample::new("PMU_A:FREQ", Ticks::new(1), 59.98);
        assert!(sample.value_quality_good);
        assert!(sample.timestamp_quality_good);
        assert_eq!(sample.adjusted_value(), 59.98);
        assert_eq!(sample.key.source(), "PMU_A");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use concentrator::{Concentrator, ConcentratorConfig, Frame, Sample, Ticks};
    use contracts::{ContractError, SourceConfig};
    use ingestion::{IngestionPipeline, MockSampleSource};
    use observability::PublicationAggregator;

    use crate::support::*;

    /// 30 samples one frame apart are published as 30 frames, in order,
    /// once the lag time has passed.
    #[test]
    fn test_thirty_frame_scenario() {
        let (clock, deliveries, concentrator) =
            manual_concentrator(ConcentratorConfig::new(30, 1.0, 1.0));
        let ticks_per_frame = concentrator.ticks_per_frame();

        let timestamps: Vec<Ticks> = (0..30)
            .map(|k| Ticks::new(T0 + (k as f64 * ticks_per_frame).round() as i64))
            .collect();
        for &timestamp in &timestamps {
            concentrator.sort_sample(Sample::new("PMU_A:FREQ", timestamp, 60.0));
        }

        // Nothing is due yet: the newest estimate is < 1 s past the first frame
        thread::sleep(Duration::from_millis(100));
        assert!(deliveries.lock().unwrap().is_empty());
        assert_eq!(concentrator.queued_frames(), 30);

        clock.advance(Ticks::from_seconds(2.0));
        assert!(wait_for(Duration::from_secs(5), || {
            deliveries.lock().unwrap().len() == 30
        }));

        let deliveries = deliveries.lock().unwrap().clone();
        assert_ordered_once(&deliveries);
        for (k, delivery) in deliveries.iter().enumerate() {
            assert_eq!(delivery.timestamp, timestamps[k]);
            assert_eq!(delivery.index, k as u32);
            assert_eq!(delivery.keys.len(), 1);
            assert_eq!(delivery.keys[0].as_str(), "PMU_A:FREQ");
        }

        let stats = concentrator.statistics();
        assert_eq!(stats.received, 30);
        assert_eq!(stats.processed, 30);
        assert_eq!(stats.discarded, 0);
        assert_eq!(stats.missed_sorts_by_timeout, 0);
        assert_eq!(stats.published_frames, 30);
        assert_eq!(stats.published_samples, 30);
        assert_eq!(concentrator.queued_frames(), 0);
    }

    #[test]
    fn test_tolerance_window_edges() {
        let (_clock, _deliveries, concentrator) =
            manual_concentrator(ConcentratorConfig::new(30, 1.0, 1.0));
        let real_time = concentrator.real_time();
        let lag = Ticks::from_seconds(1.0);

        let too_old = real_time - lag - Ticks::new(1);
        let just_in = real_time - lag + Ticks::new(1);
        concentrator.sort_sample(Sample::new("PMU_A:FREQ", too_old, 60.0));
        concentrator.sort_sample(Sample::new("PMU_A:FREQ", just_in, 60.0));

        let stats = concentrator.statistics();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.last_discarded.map(|s| s.timestamp), Some(too_old));
        assert_eq!(concentrator.queue_state()[0].timestamp, just_in);
    }

    #[test]
    fn test_arrival_sorting_uses_real_time() {
        let (_clock, _deliveries, concentrator) =
            manual_concentrator(ConcentratorConfig::new(30, 1.0, 1.0));
        let real_time = concentrator.real_time();

        // Wildly wrong timestamp, flagged as untrustworthy
        let sample = Sample::new("PMU_B:FREQ", Ticks::new(T0 - 3600 * Ticks::PER_SECOND), 60.0)
            .with_timestamp_quality(false);
        concentrator.sort_sample(sample);

        let stats = concentrator.statistics();
        assert_eq!(stats.sorted_by_arrival, 1);
        assert_eq!(stats.discarded, 0);
        let queued = concentrator.queue_state();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].timestamp, real_time);
        assert_eq!(queued[0].samples, 1);
    }

    #[test]
    fn test_same_frame_rate_is_idempotent() {
        let (_clock, _deliveries, concentrator) =
            manual_concentrator(ConcentratorConfig::new(30, 1.0, 1.0));
        let ticks_per_frame = concentrator.ticks_per_frame();
        let periods = concentrator.frame_periods();

        concentrator.set_frames_per_second(30).unwrap();

        assert_eq!(
            concentrator.ticks_per_frame().to_bits(),
            ticks_per_frame.to_bits()
        );
        assert_eq!(concentrator.frame_periods(), periods);
        assert_eq!(periods.iter().sum::<u32>(), 1000);
    }

    /// A publisher stalled for 3 s while sources keep reporting is caught
    /// up without reordering or duplicates.
    #[test]
    fn test_backlog_recovery() {
        let deliveries: Deliveries = Arc::default();
        let paused = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let aggregator = Arc::new(Mutex::new(PublicationAggregator::new()));

        let publisher = {
            let deliveries = deliveries.clone();
            let paused = paused.clone();
            let calls = calls.clone();
            let aggregator = aggregator.clone();
            move |frame: &Frame, index: u32| {
                record(&deliveries, frame, index);
                aggregator.lock().unwrap().update(frame, index, 0.0);
                if calls.fetch_add(1, Ordering::SeqCst) == 10 {
                    paused.store(true, Ordering::SeqCst);
                    thread::sleep(Duration::from_secs(3));
                    paused.store(false, Ordering::SeqCst);
                }
                Ok::<(), ContractError>(())
            }
        };

        let concentrator = Arc::new(
            Concentrator::builder(ConcentratorConfig::new(30, 0.5, 1.0))
                .publisher(publisher)
                .build()
                .unwrap(),
        );
        concentrator.start().unwrap();

        let mut pipeline = IngestionPipeline::new();
        pipeline
            .register_source(Box::new(
                MockSampleSource::new(SourceConfig::new("PMU_A", 2, 30.0)).unwrap(),
            ))
            .unwrap();
        let sink = concentrator.clone();
        pipeline.start_all(Arc::new(move |batch: Vec<Sample>| sink.sort(batch)));

        assert!(wait_for(Duration::from_secs(5), || paused.load(Ordering::SeqCst)));
        thread::sleep(Duration::from_secs(2));
        assert!(
            concentrator.queued_frames() > 45,
            "queued={}",
            concentrator.queued_frames()
        );
        assert!(concentrator.unpublished_seconds() >= 1);

        assert!(wait_for(Duration::from_secs(5), || {
            !paused.load(Ordering::SeqCst) && concentrator.queued_frames() <= 30
        }));

        pipeline.stop_all();
        concentrator.stop();

        let deliveries = deliveries.lock().unwrap().clone();
        assert!(deliveries.len() > 90, "published={}", deliveries.len());
        assert_ordered_once(&deliveries);
        assert_eq!(aggregator.lock().unwrap().summary().out_of_order_frames, 0);

        let stats = concentrator.statistics();
        assert_eq!(stats.discarded, 0);
        assert_eq!(stats.missed_sorts_by_timeout, 0);
        assert_eq!(stats.published_frames as usize, deliveries.len());
    }
}

#[cfg(test)]
mod concurrency_tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use concentrator::{ConcentratorConfig, Sample, SampleKey, Ticks};
    use contracts::Clock;
    use rand::Rng;

    use crate::support::*;

    const PRODUCERS: usize = 4;
    const SAMPLES_PER_PRODUCER: usize = 500;

    /// Producers race the publication thread while the clock moves; every
    /// accepted sample is delivered exactly once, in frame order.
    #[test]
    fn test_concurrent_producers_ordering_and_exactly_once() {
        let (clock, deliveries, concentrator) =
            manual_concentrator(ConcentratorConfig::new(30, 0.5, 1.0));

        let running = Arc::new(AtomicBool::new(true));
        let ticker = {
            let clock = clock.clone();
            let running = running.clone();
            thread::spawn(move || {
                while running.load(Ordering::Relaxed) {
                    clock.advance(Ticks::from_millis(5));
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let clock = clock.clone();
                let concentrator = concentrator.clone();
                thread::spawn(move || {
                    let mut rng = rand::rng();
                    for i in 0..SAMPLES_PER_PRODUCER {
                        // Up to 0.6 s old: some land beyond the 0.5 s lag
                        let age = rng.random_range(0..6_000_000);
                        let timestamp = clock.now() - Ticks::new(age);
                        let key = SampleKey::from_parts(&format!("P{producer}"), &format!("S{i}"));
                        concentrator.sort_sample(Sample::new(key, timestamp, i as f64));
                        if i % 10 == 0 {
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        running.store(false, Ordering::Relaxed);
        ticker.join().unwrap();

        // Let everything still queued become due
        clock.advance(Ticks::from_seconds(5.0));
        assert!(wait_for(Duration::from_secs(5), || concentrator.queued_frames() == 0));
        concentrator.stop();

        let stats = concentrator.statistics();
        let received = (PRODUCERS * SAMPLES_PER_PRODUCER) as u64;
        assert_eq!(stats.received, received);
        assert_eq!(stats.processed + stats.discarded, received);
        assert!(stats.discarded > 0);

        let deliveries = deliveries.lock().unwrap().clone();
        assert_ordered_once(&deliveries);
        // Every key is unique, so each may appear in exactly one frame
        let keys: HashSet<&SampleKey> = deliveries.iter().flat_map(|d| &d.keys).collect();
        let delivered: usize = deliveries.iter().map(|d| d.keys.len()).sum();
        assert_eq!(keys.len(), delivered);
        assert_eq!(delivered as u64, stats.processed);
        assert_eq!(stats.published_samples, stats.processed);
    }
}

#[cfg(test)]
mod config_tests {
    use std::io::Write;
    use std::path::Path;

    use concentrator::{Concentrator, Frame};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ContractError, Ticks};

    const CONFIG: &str = r#"
version = "v1"

[concentrator]
frames_per_second = 50
lag_time = 0.5
lead_time = 0.25
time_resolution_ticks = 20000000
track_latest_values = true

[[sources]]
id = "PMU_A"
signals = 6
rate_hz = 50.0
"#;

    #[test]
    fn test_config_file_builds_concentrator() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let blueprint = ConfigLoader::load_from_path(file.path()).unwrap();
        // Out-of-range resolution is clamped, not rejected
        assert_eq!(
            blueprint.concentrator.time_resolution_ticks,
            Ticks::PER_SECOND
        );

        let concentrator = Concentrator::builder(blueprint.concentrator)
            .publisher(|_: &Frame, _: u32| Ok::<(), ContractError>(()))
            .build()
            .unwrap();
        let config = concentrator.config();
        assert_eq!(config.frames_per_second, 50);
        assert!(config.track_latest_values);
        assert_eq!(concentrator.frame_periods(), vec![20; 50]);
    }

    #[test]
    fn test_json_and_toml_agree() {
        let from_toml = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&from_toml).unwrap();

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        let from_json = ConfigLoader::load_from_path(file.path()).unwrap();

        assert_eq!(from_toml.concentrator, from_json.concentrator);
        assert_eq!(from_json.sources[0].id, "PMU_A");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let err = ConfigLoader::load_from_str(
            "[concentrator]\nframes_per_second = 0\n",
            ConfigFormat::Toml,
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
        assert!(ConfigLoader::load_from_path(Path::new("missing.ini")).is_err());
    }
}
