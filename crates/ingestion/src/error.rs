//! Ingestion error types

use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Source configuration rejected
    #[error("invalid source {source_id}: {message}")]
    InvalidSource {
        /// Source ID
        source_id: String,
        /// Error message
        message: String,
    },

    /// Two sources share one ID
    #[error("source {source_id} is already registered")]
    AlreadyRegistered {
        /// Source ID
        source_id: String,
    },
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
