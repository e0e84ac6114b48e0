//! Error types for the bulk write scheduler.
//!
//! Two tiers, split by how each surfaces: [`SchedulerError`] covers the
//! synchronous validation/usage taxonomy, raised at the call site, while
//! [`WriteError`] covers what an individual operation's result channel
//! eventually carries.

use thiserror::Error;

/// Raised synchronously at the call site: validation and usage mistakes
/// that must never be allowed to enter a batch.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("writer is closed")]
    Closed,

    #[error("batch is already committed or sent")]
    AlreadyCommitted,

    #[error("document already present in this batch: {0}")]
    DuplicateDocument(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Error carried by a single operation's result.
///
/// Distinct from [`SchedulerError`]: these surface asynchronously, through
/// the operation's own result channel, and never abort sibling operations
/// in the same batch.
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// Wire-level per-write failure (`status[i] != OK` in bulk mode).
    #[error("write failed: {code} {message}")]
    Status { code: StatusCode, message: String },

    /// The RPC carrying this operation's batch failed outright. In bulk
    /// mode every sibling operation in the batch receives a clone of this
    /// same error; in commit mode the entire commit is rejected this way.
    #[error("transport error: {0}")]
    Transport(String),

    /// The batch was dropped (writer shut down, operation lost its slot)
    /// before a response was ever distributed.
    #[error("operation cancelled before a result was produced")]
    Cancelled,
}

impl From<tokio::sync::oneshot::error::RecvError> for WriteError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        WriteError::Cancelled
    }
}

/// RPC status code, mirroring the coarse `google.rpc.Code` space the
/// Transport collaborator's wire responses are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Aborted,
    FailedPrecondition,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::Aborted => "ABORTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}
