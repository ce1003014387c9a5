//! Error types for the Warden service.

use thiserror::Error;

/// Main error type for Warden operations.
///
/// Admission decisions never fail; these errors only surface while
/// configuring limiters.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A ceiling that must be positive was not
    #[error("Invalid {window} limit: {value} (must be greater than zero)")]
    InvalidLimit {
        /// Which window the ceiling belongs to ("minute" or "hour")
        window: &'static str,
        /// The rejected value
        value: i64,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for WardenError {
    fn from(err: config::ConfigError) -> Self {
        WardenError::Config(err.to_string())
    }
}

/// Result type alias for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
