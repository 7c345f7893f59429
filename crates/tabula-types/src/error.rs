use thiserror::Error;

use crate::dataset::DatasetHandle;
use crate::session::{SessionId, Step};

/// Errors from snapshot store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot '{0}' not found")]
    NotFound(DatasetHandle),

    #[error("snapshot store exhausted: {used} of {limit} bytes in use, {requested} requested")]
    Exhausted { used: u64, limit: u64, requested: u64 },

    #[error("snapshot '{0}' failed integrity check")]
    Corrupted(DatasetHandle),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Structural errors on a session. These abort the current command only;
/// the session's handles are left as they were.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("original dataset is already set to '{existing}', refusing to replace it with '{attempted}'")]
    ImmutabilityViolation {
        existing: DatasetHandle,
        attempted: DatasetHandle,
    },

    #[error("dataset '{0}' not found")]
    NotFound(DatasetHandle),

    #[error("no dataset loaded")]
    NotLoaded,

    #[error("operation not valid at step '{step}': {reason}")]
    InvalidStep { step: Step, reason: String },

    #[error("session was cancelled")]
    Cancelled,

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(handle) => SessionError::NotFound(handle),
            other => SessionError::Storage(other.to_string()),
        }
    }
}

impl From<DatasetError> for SessionError {
    fn from(err: DatasetError) -> Self {
        SessionError::Dataset(err.to_string())
    }
}

/// Recoverable failures of a single Execute attempt.
///
/// Every variant counts against the same retry bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("could not parse proposal: {0}")]
    ProposalParse(String),

    #[error("proposal generator unavailable: {0}")]
    ProposalUnavailable(String),

    #[error("{0}")]
    Execution(String),

    #[error("execution timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A (step, event) pair with no row in the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no transition from '{from}' on {event}")]
pub struct TransitionError {
    pub from: Step,
    pub event: String,
}

/// Errors from dataset parsing and I/O.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("invalid dataset: {0}")]
    Invalid(String),

    #[error("dataset is empty")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the session registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session '{0}' not found")]
    NotFound(SessionId),

    #[error("session '{0}' is busy")]
    Busy(SessionId),
}
