//! Error types for leadership monitoring and worker supervision.

use crate::Role;
use std::time::Duration;
use thiserror::Error;

/// Result type for leadership operations
pub type LeaderResult<T> = Result<T, LeaderError>;

/// Errors raised inside the monitor. None of them reach clients; the
/// monitor logs them and keeps making progress.
#[derive(Error, Debug)]
pub enum LeaderError {
    /// A role worker returned an error
    #[error("{role} worker failed: {reason}")]
    WorkerFailed { role: Role, reason: String },

    /// A role worker did not acknowledge cancellation in time
    #[error("{role} worker did not acknowledge cancellation within {waited:?}")]
    AckTimeout { role: Role, waited: Duration },

    /// A role worker ended without acknowledging (it panicked or was aborted)
    #[error("{role} worker exited without acknowledging cancellation")]
    AckLost { role: Role },

    /// Transition not allowed by the role state machine
    #[error("Invalid role transition from {from} to {to}")]
    InvalidTransition { from: Role, to: Role },

    /// Internal system error
    #[error("Internal system error: {reason}")]
    Internal { reason: String },
}

impl From<tokio::task::JoinError> for LeaderError {
    fn from(err: tokio::task::JoinError) -> Self {
        LeaderError::Internal {
            reason: format!("monitor task failed: {}", err),
        }
    }
}
