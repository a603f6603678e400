//! ConcentratorBlueprint - configuration file root
//!
//! A configuration file holds the concentrator tunables and an optional
//! list of simulated sample sources used by the CLI.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ConcentratorConfig;

/// Configuration file version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Root of a concentrator configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcentratorBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    pub concentrator: ConcentratorConfig,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// A simulated sample source (one device reporting several signals)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// Source name, used as the key prefix
    #[validate(length(min = 1, message = "source id must not be empty"))]
    pub id: String,

    /// Number of signals reported per reading
    #[validate(range(min = 1, message = "a source needs at least one signal"))]
    pub signals: usize,

    /// Readings per second
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub rate_hz: f64,

    /// Constant offset of the device clock, milliseconds
    #[serde(default)]
    pub clock_offset_ms: f64,

    /// Max random timestamp jitter, milliseconds
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub jitter_ms: f64,

    /// Probability of a reading flagged with bad timestamp quality
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub bad_timestamp_ratio: f64,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, signals: usize, rate_hz: f64) -> Self {
        Self {
            id: id.into(),
            signals,
            rate_hz,
            clock_offset_ms: 0.0,
            jitter_ms: 0.0,
            bad_timestamp_ratio: 0.0,
        }
    }
}
