//! Token estimation error types.

use thiserror::Error;

/// Errors raised while estimating tokens or registering model profiles.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The content could not be serialized for measurement.
    #[error("failed to serialize content for token estimation: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A chars-per-token ratio was not a positive finite number.
    #[error("invalid token ratio {0}: must be positive and finite")]
    InvalidRatio(f64),
    /// A profile failed validation on registration.
    #[error("invalid model profile '{name}': {reason}")]
    InvalidProfile {
        /// Profile name.
        name: String,
        /// What was wrong.
        reason: String,
    },
}

/// Result type for token operations.
pub type Result<T> = std::result::Result<T, TokenError>;
