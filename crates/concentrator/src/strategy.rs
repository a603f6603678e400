//! Frame construction strategy
//!
//! Extension point for custom frame types and merge rules. The default
//! keeps the latest sample per identity.

use contracts::{Frame, Sample, Ticks};

/// Builds frames and merges samples into them.
///
/// Called with the frame's lock held, so implementations must be quick and
/// must not call back into the concentrator.
pub trait FrameStrategy: Send + Sync + std::fmt::Debug {
    /// Creates an empty frame for a destination timestamp.
    fn create_frame(&self, timestamp: Ticks) -> Frame {
        Frame::new(timestamp)
    }

    /// Merges a sample into a frame that has not been published.
    fn assign_sample(&self, frame: &mut Frame, sample: Sample);
}

/// Insert-or-replace by [`contracts::SampleKey`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFrameStrategy;

impl FrameStrategy for DefaultFrameStrategy {
    fn assign_sample(&self, frame: &mut Frame, sample: Sample) {
        frame.samples.insert(sample.key.clone(), sample);
    }
}
