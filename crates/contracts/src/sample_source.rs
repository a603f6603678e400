//! SampleSource trait - measurement producer abstraction
//!
//! Decouples whatever decodes device data from the concentrator that sorts
//! it. Simulated and real sources expose the same API.

use std::sync::Arc;

use crate::Sample;

/// Sample batch callback type
///
/// A source hands each decoded batch to this callback. `Arc` lets one
/// callback be shared by several sources.
pub type SampleCallback = Arc<dyn Fn(Vec<Sample>) + Send + Sync>;

/// Measurement source trait
pub trait SampleSource: Send + Sync {
    /// Source id (also the key prefix of its samples)
    fn source_id(&self) -> &str;

    /// Register the batch callback and start producing
    ///
    /// Repeated calls while listening are ignored.
    fn listen(&self, callback: SampleCallback);

    /// Stop producing
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
