//! Error types for CLI operations.

use contracts::ContractError;
use ingestion::IngestionError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or applied
    #[error("Configuration error: {0}")]
    Config(#[from] ContractError),

    /// Sample source setup failed
    #[error("Source setup failed: {0}")]
    Source(#[from] IngestionError),

    /// Configuration validation failed (`validate` command)
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// Serialization of command output failed
    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
