//! Error types for the request engine

use thiserror::Error;

/// Main error type for request execution
#[derive(Debug, Error, Clone, serde::Serialize, serde::Deserialize)]
pub enum EngineError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Network error: {details}")]
    Network { details: String },

    #[error("Circuit breaker is open - reset it before sending again")]
    CircuitOpen,

    #[error("All {attempts} attempts exhausted")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Serialization error: {error}")]
    Serialization { error: String },
}

impl EngineError {
    /// Create a validation error with field and reason
    pub fn validation(field: &str, reason: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a network error
    pub fn network(details: impl Into<String>) -> Self {
        Self::Network {
            details: details.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Transport-level failures are retried per policy
            EngineError::Network { .. } => true,

            // Everything else is terminal for the current send
            EngineError::Validation { .. } => false,
            EngineError::CircuitOpen => false,
            EngineError::MaxRetriesExceeded { .. } => false,
            EngineError::InvalidFormat { .. } => false,
            EngineError::Serialization { .. } => false,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Serialization {
            error: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        EngineError::Network {
            details: error.to_string(),
        }
    }
}

/// Result type for request engine operations
pub type EngineResult<T> = Result<T, EngineError>;
