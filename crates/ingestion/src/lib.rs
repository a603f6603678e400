//! # Ingestion Pipeline
//!
//! Measurement ingestion module.
//!
//! Responsibilities:
//! - Register sample sources (simulated or device-backed)
//! - Fan every source's batches into one sink, usually `Concentrator::sort`
//! - Count batches, samples and bad timestamps on the way through
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, MockSampleSource};
//! use contracts::SourceConfig;
//!
//! let mut pipeline = IngestionPipeline::new();
//! pipeline.register_source(Box::new(MockSampleSource::new(SourceConfig::new("PMU_A", 6, 30.0))?))?;
//!
//! let sink = concentrator.clone();
//! pipeline.start_all(Arc::new(move |batch| sink.sort(batch)));
//! ```

mod config;
mod error;
mod mock;
mod pipeline;

// Re-exports
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use error::{IngestionError, Result};
pub use mock::MockSampleSource;
pub use pipeline::IngestionPipeline;
