//! Error types for telephony-core
//!
//! Radio and network failures never surface as errors: they turn into
//! disconnects (see [`crate::disconnect`]). [`TelephonyError`] covers API
//! misuse and configuration problems.

use thiserror::Error;

use crate::types::{CallState, ConferenceId, ConnectionId, PhoneId};

/// Result type for telephony-core operations
pub type Result<T> = std::result::Result<T, TelephonyError>;

/// Errors that can occur in telephony-core
#[derive(Debug, Error)]
pub enum TelephonyError {
    /// Connection not found
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Conference not found
    #[error("Conference not found: {0}")]
    ConferenceNotFound(ConferenceId),

    /// Phone not found
    #[error("Phone not found: {0}")]
    PhoneNotFound(PhoneId),

    /// Operation not valid in the current call state
    #[error("Invalid state for {operation}: {state}")]
    InvalidState {
        operation: String,
        state: CallState,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Logging could not be installed
    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TelephonyError {
    /// Create an invalid state error
    pub fn invalid_state(operation: impl Into<String>, state: CallState) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
