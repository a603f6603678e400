//! TrackingFrame - a queued frame and its publication state
//!
//! The published flag and the sample map share one mutex, so "check not
//! published, then insert" and "mark published" can never interleave.

use std::collections::HashMap;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{DownsamplingMethod, Frame, Sample, SampleKey, Ticks};

use crate::strategy::FrameStrategy;

/// What down-sampling needs to know about the sample kept for an identity.
#[derive(Debug, Clone, Copy)]
struct Kept {
    deviation: i64,
    quality_good: bool,
}

impl Kept {
    fn of(sample: &Sample, frame_time: Ticks) -> Self {
        Self {
            deviation: sample.timestamp.value().abs_diff(frame_time.value()).min(i64::MAX as u64) as i64,
            quality_good: sample.value_quality_good && sample.timestamp_quality_good,
        }
    }

    /// Whether `candidate` replaces the kept sample under `method`.
    fn replaced_by(&self, candidate: &Kept, method: DownsamplingMethod) -> bool {
        match method {
            DownsamplingMethod::LastReceived => true,
            DownsamplingMethod::Closest => candidate.deviation < self.deviation,
            DownsamplingMethod::BestQuality => match (self.quality_good, candidate.quality_good) {
                (false, true) => true,
                (true, false) => false,
                _ => candidate.deviation < self.deviation,
            },
        }
    }
}

#[derive(Debug)]
struct FrameState {
    frame: Frame,
    kept: HashMap<SampleKey, Kept>,
}

#[derive(Debug)]
pub(crate) struct TrackingFrame {
    timestamp: Ticks,
    /// Real time at which the frame entered the queue
    created: Ticks,
    state: Mutex<FrameState>,
}

impl TrackingFrame {
    pub fn new(frame: Frame, created: Ticks) -> Self {
        Self {
            timestamp: frame.timestamp,
            created,
            state: Mutex::new(FrameState {
                frame,
                kept: HashMap::new(),
            }),
        }
    }

    #[inline]
    pub fn timestamp(&self) -> Ticks {
        self.timestamp
    }

    #[inline]
    pub fn created(&self) -> Ticks {
        self.created
    }

    fn lock(&self) -> MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assigns a sample unless the frame was already published.
    ///
    /// A repeated identity is down-sampled: the sample still counts as
    /// sorted, but only reaches the strategy when `method` prefers it over
    /// the one already kept. `Closest` and `BestQuality` store it re-stamped
    /// at the frame timestamp. Hands the sample back when publication won
    /// the race.
    pub fn try_assign(
        &self,
        sample: Sample,
        strategy: &dyn FrameStrategy,
        method: DownsamplingMethod,
    ) -> Result<(), Sample> {
        let mut state = self.lock();
        let FrameState { frame, kept } = &mut *state;
        if frame.published {
            return Err(sample);
        }
        frame.last_sorted = Some(sample.clone());
        frame.sorted_count += 1;

        let candidate = Kept::of(&sample, self.timestamp);
        match kept.get_mut(&sample.key) {
            Some(existing) => {
                frame.downsampled_count += 1;
                if !existing.replaced_by(&candidate, method) {
                    return Ok(());
                }
                *existing = candidate;
            }
            None => {
                kept.insert(sample.key.clone(), candidate);
            }
        }
        let sample = match method {
            DownsamplingMethod::LastReceived => sample,
            // Nearest-sample methods stand in for the frame time itself.
            DownsamplingMethod::Closest | DownsamplingMethod::BestQuality => {
                sample.with_timestamp(self.timestamp)
            }
        };
        strategy.assign_sample(frame, sample);
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        self.lock().frame.len()
    }

    /// Successful assignments so far, down-sampled repeats included.
    pub fn sorted_count(&self) -> usize {
        self.lock().frame.sorted_count
    }

    pub fn is_published(&self) -> bool {
        self.lock().frame.published
    }

    /// Marks the frame published and takes its contents.
    ///
    /// Only the first call returns the samples; later calls get an empty
    /// published frame.
    pub fn publish(&self) -> Frame {
        let mut state = self.lock();
        state.kept.clear();
        let mut taken = mem::replace(&mut state.frame, Frame::new(self.timestamp));
        taken.published = true;
        state.frame.published = true;
        taken
    }
}
