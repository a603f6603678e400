//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the concentrator
//! workspace. Business crates depend on this crate only; reverse
//! dependencies are prohibited.
//!
//! ## Time Model
//! - All timestamps are [`Ticks`]: 100 ns intervals since the Unix epoch
//! - "Real time" is the concentrator's estimate of now, derived from a [`Clock`]

mod blueprint;
mod clock;
mod config;
mod error;
mod event;
mod frame;
mod publisher;
mod sample;
mod sample_key;
mod sample_source;
mod stats;
mod ticks;

pub use blueprint::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use error::*;
pub use event::{ConcentratorEvent, EventCallback};
pub use frame::Frame;
pub use publisher::FramePublisher;
pub use sample::Sample;
pub use sample_key::SampleKey;
pub use sample_source::{SampleCallback, SampleSource};
pub use stats::StatisticsSnapshot;
pub use ticks::Ticks;
