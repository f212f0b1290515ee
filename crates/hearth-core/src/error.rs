//! Shared error taxonomy
//!
//! Every subsystem defines its own `thiserror` enum, but all of them map
//! into one machine-readable [`ErrorKind`] so transport collaborators can
//! classify failures without matching on subsystem internals.

use serde::{Deserialize, Serialize};

/// Machine-readable classification carried by every subsystem error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed event or out-of-range parameter
    InvalidInput,
    /// Unknown node, candidate, or zone
    NotFound,
    /// Terminal-state candidate cannot be re-decided
    Conflict,
    /// Mining run rejected inside the cooldown window
    Throttled,
    /// Persistence error; caller may retry once after back-off
    StorageFailure,
    /// Cooperative cancellation completed normally
    Cancelled,
    /// Contract violation; logged and reported, never auto-retried
    Internal,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Throttled => "throttled",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the operation may be retried by the caller.
    ///
    /// Only storage failures are retryable; `Internal` is explicitly not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::StorageFailure)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Implemented by every subsystem error enum.
pub trait CoreError: std::error::Error {
    /// Classify this error into the shared taxonomy.
    fn kind(&self) -> ErrorKind;
}
