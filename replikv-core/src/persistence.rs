use crate::state_machine::SnapshotSource;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata describing one persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: String,
    /// Monotonic per store; higher is newer
    pub sequence: u64,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub created_at: u64,
}

/// Destination a snapshot is streamed into.
///
/// A sink is either closed, which makes the snapshot visible to readers of
/// the store, or cancelled, which discards everything written so far.
#[async_trait]
pub trait SnapshotSink: Send {
    fn id(&self) -> &str;

    async fn write(&mut self, buf: &[u8]) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<SnapshotMeta>;

    async fn cancel(self: Box<Self>) -> Result<()>;
}

/// Storage for snapshots used for log compaction and member bootstrap.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Opens a new sink. The snapshot is not listed until the sink closes.
    async fn create(&self) -> Result<Box<dyn SnapshotSink>>;

    /// Lists complete snapshots, newest first.
    async fn list(&self) -> Result<Vec<SnapshotMeta>>;

    async fn open(&self, id: &str) -> Result<SnapshotSource>;

    /// Opens the newest snapshot, or `None` on first startup.
    async fn open_latest(&self) -> Result<Option<(SnapshotMeta, SnapshotSource)>> {
        match self.list().await?.into_iter().next() {
            Some(meta) => {
                let source = self.open(&meta.id).await?;
                Ok(Some((meta, source)))
            }
            None => Ok(None),
        }
    }
}
