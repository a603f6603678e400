//! # Concentrator
//!
//! Real-time measurement concentrator.
//!
//! Accepts an unordered, concurrent stream of timestamped samples and
//! publishes them as evenly spaced, time-aligned frames, each exactly once
//! and in ascending timestamp order.
//!
//! Responsibilities:
//! - Frame-rate timer with integer millisecond waits
//! - Timestamp to frame bucketing
//! - Bounded real-time estimation
//! - Lag/lead tolerance window and statistics
//!
//! ## Usage
//!
//! ```ignore
//! use concentrator::{Concentrator, ConcentratorConfig};
//!
//! let concentrator = Concentrator::builder(ConcentratorConfig::new(30, 3.0, 1.0))
//!     .publisher(|frame: &Frame, index: u32| {
//!         println!("frame {index}: {} samples", frame.len());
//!         Ok(())
//!     })
//!     .build()?;
//!
//! concentrator.start()?;
//! concentrator.sort(samples);
//! ```

mod engine;
mod frame;
mod frame_queue;
mod latest;
mod real_time;
mod statistics;
mod status;
mod strategy;
mod timer;

pub use engine::{Concentrator, ConcentratorBuilder};
pub use frame_queue::QueuedFrame;
pub use strategy::{DefaultFrameStrategy, FrameStrategy};
pub use timer::{frame_periods, MAX_TIMER_RATE};

// Re-export contracts types
pub use contracts::{
    ConcentratorConfig, ConcentratorEvent, EventCallback, Frame, FramePublisher, Sample,
    SampleKey, StatisticsSnapshot, Ticks,
};
