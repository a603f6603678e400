//! FramePublisher trait - Concentrator output interface
//!
//! Defines the abstract interface for frame consumers.

use crate::{ContractError, Frame};

/// Frame output trait
///
/// Called from the publication thread, one frame at a time, in strictly
/// ascending timestamp order.
pub trait FramePublisher: Send {
    /// Publisher name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Consume a completed frame
    ///
    /// `index` is the frame's position within its second, `0..fps`.
    ///
    /// # Errors
    /// A returned error is reported as a processing exception; the frame is
    /// still considered published.
    fn publish(&mut self, frame: &Frame, index: u32) -> Result<(), ContractError>;
}

impl<F> FramePublisher for F
where
    F: FnMut(&Frame, u32) -> Result<(), ContractError> + Send,
{
    fn name(&self) -> &str {
        "closure"
    }

    fn publish(&mut self, frame: &Frame, index: u32) -> Result<(), ContractError> {
        self(frame, index)
    }
}
