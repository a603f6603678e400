//! Sample - one timestamped scalar reading

use serde::{Deserialize, Serialize};

use crate::{SampleKey, Ticks};

fn default_multiplier() -> f64 {
    1.0
}

fn default_quality() -> bool {
    true
}

/// A timestamped scalar reading produced by an external decoder.
///
/// Samples are treated as immutable once created; derived samples are made
/// with [`Sample::with_timestamp`] / [`Sample::with_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Signal identity (source + signal)
    pub key: SampleKey,

    /// Sample timestamp
    pub timestamp: Ticks,

    /// Raw value
    pub value: f64,

    /// Additive offset applied by [`Sample::adjusted_value`]
    #[serde(default)]
    pub adder: f64,

    /// Scale factor applied by [`Sample::adjusted_value`]
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Value quality flag
    #[serde(default = "default_quality")]
    pub value_quality_good: bool,

    /// Timestamp quality flag (false when e.g. GPS lock was lost)
    #[serde(default = "default_quality")]
    pub timestamp_quality_good: bool,
}

impl Sample {
    /// Create a good-quality sample with unit scaling.
    pub fn new(key: impl Into<SampleKey>, timestamp: Ticks, value: f64) -> Self {
        Self {
            key: key.into(),
            timestamp,
            value,
            adder: 0.0,
            multiplier: 1.0,
            value_quality_good: true,
            timestamp_quality_good: true,
        }
    }

    pub fn with_scaling(mut self, adder: f64, multiplier: f64) -> Self {
        self.adder = adder;
        self.multiplier = multiplier;
        self
    }

    pub fn with_value_quality(mut self, good: bool) -> Self {
        self.value_quality_good = good;
        self
    }

    pub fn with_timestamp_quality(mut self, good: bool) -> Self {
        self.timestamp_quality_good = good;
        self
    }

    /// Clone of this sample re-stamped at `timestamp`.
    pub fn with_timestamp(&self, timestamp: Ticks) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    /// Clone of this sample carrying `value`.
    pub fn with_value(&self, value: f64) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    /// `value * multiplier + adder`
    #[inline]
    pub fn adjusted_value(&self) -> f64 {
        self.value * self.multiplier + self.adder
    }

    #[inline]
    pub fn key(&self) -> &SampleKey {
        &self.key
    }
}
