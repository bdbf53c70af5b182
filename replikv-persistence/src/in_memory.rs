use crate::{now_millis, snapshot_id, SnapshotStoreConfig};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use replikv_core::persistence::{SnapshotMeta, SnapshotSink, SnapshotStore};
use replikv_core::state_machine::SnapshotSource;
use replikv_core::{ReplikvError, Result};
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Snapshots {
    next_sequence: u64,
    /// Oldest first
    complete: Vec<(SnapshotMeta, Bytes)>,
}

/// Snapshot store that keeps everything in memory.
///
/// Suitable for tests and for nodes that always bootstrap from a peer.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    config: SnapshotStoreConfig,
    snapshots: Arc<RwLock<Snapshots>>,
}

impl InMemorySnapshotStore {
    pub fn new(config: SnapshotStoreConfig) -> Self {
        Self {
            config,
            snapshots: Arc::new(RwLock::new(Snapshots::default())),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn create(&self) -> Result<Box<dyn SnapshotSink>> {
        let sequence = {
            let mut snapshots = self.snapshots.write();
            snapshots.next_sequence += 1;
            snapshots.next_sequence
        };
        Ok(Box::new(InMemorySink {
            id: snapshot_id(sequence),
            sequence,
            buf: Vec::new(),
            retain: self.config.retain(),
            snapshots: Arc::clone(&self.snapshots),
        }))
    }

    async fn list(&self) -> Result<Vec<SnapshotMeta>> {
        let snapshots = self.snapshots.read();
        Ok(snapshots
            .complete
            .iter()
            .rev()
            .map(|(meta, _)| meta.clone())
            .collect())
    }

    async fn open(&self, id: &str) -> Result<SnapshotSource> {
        let snapshots = self.snapshots.read();
        snapshots
            .complete
            .iter()
            .find(|(meta, _)| meta.id == id)
            .map(|(_, data)| Box::new(Cursor::new(data.clone())) as SnapshotSource)
            .ok_or_else(|| ReplikvError::restore_io(format!("snapshot {} not found", id)))
    }
}

struct InMemorySink {
    id: String,
    sequence: u64,
    buf: Vec<u8>,
    retain: usize,
    snapshots: Arc<RwLock<Snapshots>>,
}

#[async_trait]
impl SnapshotSink for InMemorySink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<SnapshotMeta> {
        let InMemorySink {
            id,
            sequence,
            buf,
            retain,
            snapshots,
        } = *self;
        let meta = SnapshotMeta {
            id,
            sequence,
            size: buf.len() as u64,
            created_at: now_millis(),
        };

        let mut snapshots = snapshots.write();
        snapshots.complete.push((meta.clone(), Bytes::from(buf)));
        snapshots.complete.sort_by_key(|(meta, _)| meta.sequence);
        let excess = snapshots.complete.len().saturating_sub(retain);
        snapshots.complete.drain(..excess);

        Ok(meta)
    }

    async fn cancel(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
