//! Human readable status report

use std::fmt::Write;

use crate::Concentrator;

impl Concentrator {
    /// Multi-line report of configuration, timing and statistics.
    pub fn status(&self) -> String {
        let config = self.config();
        let stats = self.statistics();
        let real_time = self.real_time();
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "      Data concentration: {}",
            if self.is_enabled() { "Enabled" } else { "Disabled" }
        );
        let _ = writeln!(out, "               Publisher: {}", self.publisher_name());
        let _ = writeln!(out, "       Current real time: {real_time}");
        let _ = writeln!(
            out,
            "       Real time source: {}",
            if config.use_local_clock_as_real_time {
                "local clock"
            } else {
                "latest sample timestamp"
            }
        );
        let _ = writeln!(out, "        Process run time: {:.3} seconds", stats.run_time);
        let _ = writeln!(out, "       Frames per second: {}", config.frames_per_second);
        let _ = writeln!(out, "                Lag time: {} seconds", config.lag_time);
        let _ = writeln!(out, "               Lead time: {} seconds", config.lead_time);
        let resolution = config.time_resolution_ticks;
        if config.round_to_nearest_timestamp {
            let _ = writeln!(out, "         Time resolution: nearest frame");
        } else if resolution > 1 {
            let _ = writeln!(out, "         Time resolution: {resolution} ticks");
        } else {
            let _ = writeln!(out, "         Time resolution: raw timestamps");
        }
        let _ = writeln!(
            out,
            "       Sorting by arrival: {}",
            if config.sorts_by_arrival() { "allowed" } else { "not allowed" }
        );
        let _ = writeln!(
            out,
            "   Timestamp reasonability: {}",
            if config.perform_timestamp_reasonability_check { "checked" } else { "unchecked" }
        );
        if config.process_by_received_timestamp {
            let _ = writeln!(out, "       Frame publication: by received time");
        }
        let _ = writeln!(out, "    Down-sampling method: {}", config.downsampling_method);
        if config.allow_preemptive_publishing && config.expected_samples > 0 {
            let _ = writeln!(
                out,
                "   Preemptive publishing: at {} samples per frame",
                config.expected_samples
            );
        }
        let _ = writeln!(
            out,
            "    Latest value tracking: {}",
            if config.track_latest_values { "on" } else { "off" }
        );

        let _ = writeln!(out, "   Received measurements: {}", stats.received);
        let _ = writeln!(out, "  Processed measurements: {}", stats.processed);
        let _ = writeln!(
            out,
            "  Discarded measurements: {} ({:.2}%)",
            stats.discarded,
            stats.loss_ratio() * 100.0
        );
        let _ = writeln!(
            out,
            "       Sorted by arrival: {} (time accuracy {:.2}%)",
            stats.sorted_by_arrival,
            stats.measurement_time_accuracy() * 100.0
        );
        let _ = writeln!(
            out,
            "  Missed sorts (timeout): {} ({:.2}%)",
            stats.missed_sorts_by_timeout,
            stats.timeout_loss_ratio() * 100.0
        );
        let _ = writeln!(
            out,
            "Down-sampled measurements: {} ({:.2}%)",
            stats.downsampled,
            stats.downsampling_application() * 100.0
        );
        let _ = writeln!(out, "        Published frames: {}", stats.published_frames);
        let _ = writeln!(out, "  Published measurements: {}", stats.published_samples);
        let _ = writeln!(
            out,
            "Frames ahead of schedule: {}",
            stats.frames_ahead_of_schedule
        );
        let _ = writeln!(
            out,
            "    Average publish time: {:.4} ms",
            stats.average_publication_time_ms()
        );
        let _ = writeln!(out, "         Mean frame rate: {:.2} fps", stats.mean_frame_rate());
        let _ = writeln!(
            out,
            "           Queued frames: {} ({} unpublished seconds)",
            self.queued_frames(),
            self.unpublished_seconds()
        );

        if let Some(sample) = &stats.last_discarded {
            let _ = writeln!(
                out,
                "          Last discarded: {} @ {} ({:.3} s from real time)",
                sample.key, sample.timestamp, stats.last_discarded_latency
            );
        }
        if let Some(timestamp) = stats.last_published_timestamp {
            let _ = write!(out, "    Last published frame: {timestamp}");
            if let Some(sample) = &stats.last_published_sample {
                let _ = write!(out, " (last sorted {} = {})", sample.key, sample.adjusted_value());
            }
            let _ = writeln!(out);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use crate::Concentrator;
    use contracts::{ConcentratorConfig, ContractError, Frame, ManualClock, Sample, Ticks};
    use std::sync::Arc;

    #[test]
    fn test_status_report() {
        let t0 = Ticks::new(638_000_000_000_000_000);
        let concentrator = Concentrator::builder(ConcentratorConfig::new(30, 1.0, 1.0))
            .clock(Arc::new(ManualClock::new(t0)))
            .publisher(|_: &Frame, _: u32| Ok::<(), ContractError>(()))
            .build()
            .unwrap();

        let status = concentrator.status();
        assert!(status.contains("Data concentration: Disabled"));
        assert!(status.contains("Frames per second: 30"));
        assert!(status.contains("raw timestamps"));
        assert!(status.contains("Down-sampling method: last received"));

        concentrator.start().unwrap();
        concentrator.sort_sample(Sample::new("PMU_A:FREQ", Ticks::new(0), 60.0));

        let status = concentrator.status();
        assert!(status.contains("Data concentration: Enabled"));
        assert!(status.contains("Received measurements: 1"));
        assert!(status.contains("Last discarded: PMU_A:FREQ"));
        assert!(status.contains("Down-sampled measurements: 0"));

        concentrator.set_round_to_nearest_timestamp(true);
        concentrator.set_process_by_received_timestamp(true);
        let status = concentrator.status();
        assert!(status.contains("nearest frame"));
        assert!(status.contains("by received time"));
        assert!(status.contains("Real time source: local clock"));
    }
}
