//! Unified error handling for backupctl-core
//!
//! Every remote failure is folded into one taxonomy so callers can branch on
//! the kind of failure instead of on HTTP details.
//!
//! # Example
//!
//! ```rust
//! use backupctl_core::{CoreError, Result};
//!
//! fn handle_error(err: CoreError) {
//!     if err.is_not_found() {
//!         println!("Resource not found");
//!     } else if err.is_precondition_failed() {
//!         println!("Resource is still in use");
//!     }
//! }
//!
//! let err = CoreError::NotFound("backups/b1".to_string());
//! assert!(err.is_not_found());
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Core error type for admin operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Network, TLS or authentication failure talking to the service
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed identifiers, time ranges or requests
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The resource is not in a state that allows the request
    /// (e.g. a backup still referenced by restored databases)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The named resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Polling deadline exceeded
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The long-running operation finished with an error
    #[error("Operation failed (code {code}): {message}")]
    OperationFailed { code: i32, message: String },

    /// The long-running operation was cancelled
    #[error("Operation {0} was cancelled")]
    OperationCancelled(String),

    /// Any other error status returned by the service
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered with a body we could not decode
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Returns true if this is a "not found" error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    /// Returns true for connectivity and authentication failures
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, CoreError::Transport(_))
    }

    /// Returns true if the request itself was rejected as malformed
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, CoreError::InvalidArgument(_))
    }

    /// Returns true if this is a failed-precondition error
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, CoreError::PreconditionFailed(_))
    }

    /// Returns true if this is a polling timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout(_))
    }

    /// Returns true if a caller could reasonably try again later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Transport(_) | CoreError::Timeout(_) => true,
            CoreError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Map a service error status (and HTTP code as fallback) to a variant.
    ///
    /// `status` is the canonical status name from the error body, e.g.
    /// `FAILED_PRECONDITION`.
    pub fn from_status(http_status: u16, status: Option<&str>, message: String) -> Self {
        match status {
            Some("INVALID_ARGUMENT") | Some("OUT_OF_RANGE") => {
                return CoreError::InvalidArgument(message);
            }
            Some("FAILED_PRECONDITION") => return CoreError::PreconditionFailed(message),
            Some("NOT_FOUND") => return CoreError::NotFound(message),
            Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => {
                return CoreError::Transport(message);
            }
            _ => {}
        }

        match http_status {
            400 => CoreError::InvalidArgument(message),
            401 | 403 => CoreError::Transport(message),
            404 => CoreError::NotFound(message),
            409 | 412 => CoreError::PreconditionFailed(message),
            _ => CoreError::Api {
                status: http_status,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CoreError::Decode(err.to_string())
        } else {
            CoreError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for CoreError {
    fn from(err: url::ParseError) -> Self {
        CoreError::InvalidArgument(format!("invalid endpoint URL: {}", err))
    }
}
