use crate::persistence::{SnapshotMeta, SnapshotSink};
use crate::{Entry, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

/// Per-entry outcome handed back to the consensus engine: the encoded
/// [`CommandResult`](crate::CommandResult) or an entry error returned as data.
pub type ApplyResponse = Result<Bytes>;

/// Boxed byte stream a snapshot is restored from.
pub type SnapshotSource = Box<dyn AsyncRead + Send + Unpin>;

/// An immutable point-in-time copy of replicated state.
///
/// Produced by [`StateMachine::snapshot`] while briefly holding the state
/// lock; serialization happens later in [`persist`](Self::persist), outside
/// of any lock.
#[async_trait]
pub trait StateSnapshot: Send + Sync {
    /// Writes the snapshot to `sink` and closes it. On failure the sink is
    /// cancelled so no partial snapshot becomes visible.
    async fn persist(&self, sink: Box<dyn SnapshotSink>) -> Result<SnapshotMeta>;

    /// Called by the engine once it is done with the snapshot.
    fn release(&self) {}
}

/// Deterministic state machine driven by the consensus engine.
///
/// The engine guarantees `apply` calls are strictly sequential and that
/// `restore` never runs concurrently with `apply`. `snapshot` may run
/// concurrently with both.
#[async_trait]
pub trait StateMachine: Send + Sync {
    type Snapshot: StateSnapshot + 'static;

    /// Applies one committed entry. Never panics; per-entry failures are
    /// returned as `Err` without mutating state.
    fn apply(&self, entry: &Entry) -> ApplyResponse;

    /// Captures a consistent view of the state.
    fn snapshot(&self) -> Result<Self::Snapshot>;

    /// Fully replaces the state with the content of `source`.
    async fn restore(&self, source: SnapshotSource) -> Result<()>;
}
