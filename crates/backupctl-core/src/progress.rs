//! Progress events for long-running operations
//!
//! The facade reports what it is doing through an optional callback so the
//! CLI can drive a spinner while library callers stay silent.

use std::time::Duration;

/// Progress events emitted while an operation is tracked
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Operation accepted by the service
    Started { operation: String },
    /// One polling iteration that found the operation still running
    Polling {
        operation: String,
        progress_percent: Option<i32>,
        elapsed: Duration,
    },
    /// Cancellation was requested
    CancelRequested { operation: String },
    /// Operation finished successfully
    Completed { operation: String },
    /// Operation finished as cancelled
    Cancelled { operation: String },
    /// Operation finished with an error
    Failed { operation: String, error: String },
    /// Polling gave up; the operation may still be running
    TimedOut { operation: String, waited: Duration },
}

/// Callback type for progress updates
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Helper to emit progress events
pub(crate) fn emit(callback: &Option<ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}
