//! Concentrator configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};

use crate::{ContractError, Ticks};

/// How several samples of one identity landing in the same frame are
/// reduced to one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownsamplingMethod {
    /// Keep the sample received last
    #[default]
    LastReceived,
    /// Keep the sample whose timestamp is closest to the frame time
    Closest,
    /// Prefer good quality, then closest to the frame time
    BestQuality,
}

impl std::fmt::Display for DownsamplingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LastReceived => "last received",
            Self::Closest => "closest",
            Self::BestQuality => "best quality",
        };
        f.write_str(name)
    }
}

/// Concentrator configuration
///
/// Every field is validated when assigned; see [`ConcentratorConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcentratorConfig {
    /// Frames published per second (> 0)
    pub frames_per_second: u32,

    /// Past time deviation tolerance in seconds (> 0, may be sub-second)
    pub lag_time: f64,

    /// Future time deviation tolerance in seconds (> 0); also the trusted
    /// accuracy of the local clock
    pub lead_time: f64,

    /// Maximum sorting resolution in ticks, `0..=Ticks::PER_SECOND`
    /// (0 or 1 = raw timestamps)
    pub time_resolution_ticks: i64,

    /// Sort samples with bad timestamp quality by their arrival time
    pub allow_sorts_by_arrival: bool,

    /// Treat the local clock as real time instead of the latest sample time
    pub use_local_clock_as_real_time: bool,

    /// Keep a table of the latest value per identity
    pub track_latest_values: bool,

    /// Ignore the timestamp quality flag entirely
    pub ignore_bad_timestamps: bool,

    /// Validate sample timestamps against the local clock +/- lead time
    pub perform_timestamp_reasonability_check: bool,

    /// Publish a frame before its lag time once `expected_samples` arrived
    pub allow_preemptive_publishing: bool,

    /// Samples expected per frame (0 = unknown)
    pub expected_samples: usize,

    /// Reduction applied when one identity lands in a frame more than once
    pub downsampling_method: DownsamplingMethod,

    /// Bucket into the nearest frame instead of rounding up
    pub round_to_nearest_timestamp: bool,

    /// Skip the lag/lead window on sort and publish frames once they have
    /// existed for the lag time. Forces the local clock as real time and
    /// disables arrival sorting.
    pub process_by_received_timestamp: bool,
}

impl Default for ConcentratorConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 30,
            lag_time: 3.0,
            lead_time: 1.0,
            time_resolution_ticks: 0,
            allow_sorts_by_arrival: true,
            use_local_clock_as_real_time: false,
            track_latest_values: false,
            ignore_bad_timestamps: false,
            perform_timestamp_reasonability_check: true,
            allow_preemptive_publishing: true,
            expected_samples: 0,
            downsampling_method: DownsamplingMethod::LastReceived,
            round_to_nearest_timestamp: false,
            process_by_received_timestamp: false,
        }
    }
}

impl ConcentratorConfig {
    /// Convenience constructor for the three primary tunables.
    pub fn new(frames_per_second: u32, lag_time: f64, lead_time: f64) -> Self {
        Self {
            frames_per_second,
            lag_time,
            lead_time,
            ..Default::default()
        }
    }

    /// Rejects invalid values and clamps the time resolution in place.
    ///
    /// The time resolution is the one field that is clamped instead of
    /// rejected, matching the legacy behavior of the concentrator.
    pub fn validate(&mut self) -> Result<(), ContractError> {
        validate_frames_per_second(self.frames_per_second)?;
        validate_tolerance("lag_time", self.lag_time)?;
        validate_tolerance("lead_time", self.lead_time)?;
        self.time_resolution_ticks = clamp_time_resolution(self.time_resolution_ticks);
        if self.process_by_received_timestamp {
            self.use_local_clock_as_real_time = true;
            self.allow_sorts_by_arrival = false;
        }
        Ok(())
    }

    #[inline]
    pub fn lag_ticks(&self) -> Ticks {
        Ticks::from_seconds(self.lag_time)
    }

    #[inline]
    pub fn lead_ticks(&self) -> Ticks {
        Ticks::from_seconds(self.lead_time)
    }

    /// Ideal (fractional) frame spacing in ticks.
    #[inline]
    pub fn ticks_per_frame(&self) -> f64 {
        Ticks::PER_SECOND as f64 / f64::from(self.frames_per_second)
    }

    /// Whether a sample with bad timestamp quality is re-stamped on arrival.
    #[inline]
    pub fn sorts_by_arrival(&self) -> bool {
        !self.ignore_bad_timestamps && self.allow_sorts_by_arrival
    }
}

pub fn validate_frames_per_second(value: u32) -> Result<(), ContractError> {
    if value == 0 {
        return Err(ContractError::config_validation(
            "frames_per_second",
            "frames per second must be greater than 0",
        ));
    }
    Ok(())
}

pub fn validate_tolerance(field: &str, seconds: f64) -> Result<(), ContractError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ContractError::config_validation(
            field,
            format!("{field} must be greater than zero, but it can be less than one (got {seconds})"),
        ));
    }
    Ok(())
}

/// Clamps a time resolution into `0..=Ticks::PER_SECOND`.
#[inline]
pub fn clamp_time_resolution(ticks: i64) -> i64 {
    ticks.clamp(0, Ticks::PER_SECOND)
}
