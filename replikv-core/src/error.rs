//! # Error Types
//!
//! Error taxonomy shared by the replicated state machine, the snapshot
//! stores and the client-facing service.

use thiserror::Error;

/// Error types that can occur while applying, snapshotting, restoring or
/// submitting commands.
///
/// Per-entry apply failures (`Malformed`, `InvalidFilter`) are returned as
/// data to the consensus engine and never mutate state. Snapshot and restore
/// failures are fatal to the operation that requested them.
///
/// # Error Categories
///
/// - **Entry Errors**: undecodable payloads and bad `List` filters
/// - **Snapshot Errors**: serialization, sink and stream failures
/// - **Routing Errors**: requests that reached a node that is not the leader
/// - **Timeout Errors**: submissions that exceeded the caller's deadline
///
/// # Examples
///
/// ```rust
/// use replikv_core::ReplikvError;
///
/// let error = ReplikvError::not_leader(Some("node-2".to_string()));
/// assert!(error.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum ReplikvError {
    /// Entry payload could not be decoded into a command
    #[error("Malformed entry: {reason}")]
    Malformed { reason: String },

    /// User-supplied `List` filter failed to compile
    #[error("Invalid filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    /// Snapshot could not be produced or written to its sink
    #[error("Snapshot error: {message}")]
    SnapshotIo { message: String },

    /// Snapshot stream could not be read or decoded
    #[error("Restore error: {message}")]
    RestoreIo { message: String },

    /// Snapshot content does not match its recorded checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Request reached a node that is not the current leader
    #[error("Not the leader (current leader: {})", .leader.as_deref().unwrap_or("unknown"))]
    NotLeader { leader: Option<String> },

    /// Operation exceeded its timeout
    #[error("Timeout occurred: {operation}")]
    Timeout { operation: String },

    /// Consensus engine rejected or lost the submission
    #[error("Consensus error: {message}")]
    Consensus { message: String },

    /// JSON serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result alias used throughout replikv.
pub type Result<T> = std::result::Result<T, ReplikvError>;

impl ReplikvError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn invalid_filter(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    pub fn snapshot_io(message: impl Into<String>) -> Self {
        Self::SnapshotIo {
            message: message.into(),
        }
    }

    pub fn restore_io(message: impl Into<String>) -> Self {
        Self::RestoreIo {
            message: message.into(),
        }
    }

    pub fn not_leader(leader: Option<String>) -> Self {
        Self::NotLeader { leader }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn consensus(message: impl Into<String>) -> Self {
        Self::Consensus {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Determines if the caller may retry the request, possibly against a
    /// different node.
    ///
    /// `NotLeader` tells the caller to re-target the current leader;
    /// `Timeout` and `Consensus` are transient engine conditions. Entry and
    /// snapshot errors are deterministic and retrying cannot help.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use replikv_core::ReplikvError;
    ///
    /// assert!(ReplikvError::timeout("apply").is_retryable());
    /// assert!(!ReplikvError::malformed("not json").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotLeader { .. } | Self::Timeout { .. } | Self::Consensus { .. }
        )
    }

    /// True for errors produced by applying a single entry.
    pub fn is_entry_error(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::InvalidFilter { .. })
    }
}
