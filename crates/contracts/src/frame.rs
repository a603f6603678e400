//! Frame - the publication unit
//!
//! All samples whose timestamps map to one destination tick.

use serde::Serialize;
use std::collections::HashMap;

use crate::{Sample, SampleKey, Ticks};

/// Samples collected for a single destination timestamp.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Frame {
    /// Destination timestamp
    pub timestamp: Ticks,

    /// Latest sample per identity
    pub samples: HashMap<SampleKey, Sample>,

    /// Set once the frame has been handed to the publisher
    pub published: bool,

    /// Most recently sorted sample
    pub last_sorted: Option<Sample>,

    /// Number of successful assignments (replacements included)
    pub sorted_count: usize,

    /// Assignments that merged into an identity already in the frame
    pub downsampled_count: usize,
}

impl Frame {
    pub fn new(timestamp: Ticks) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Sample> {
        self.samples.get(key)
    }
}
