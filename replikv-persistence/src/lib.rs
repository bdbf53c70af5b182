//! # Replikv Persistence
//!
//! Snapshot stores for the replikv state machine.
//!
//! The consensus engine asks the state machine for a snapshot, hands it a
//! [`SnapshotSink`](replikv_core::persistence::SnapshotSink) from one of
//! these stores, and later opens the newest snapshot to bootstrap a node.
//!
//! ## Implementations
//!
//! - [`InMemorySnapshotStore`] - Snapshots kept in memory (testing/non-persistent)
//! - [`FileSnapshotStore`] - Snapshots kept in a directory (persistent across restarts)
//!
//! Both keep the newest [`SnapshotStoreConfig::retain`] complete snapshots.
//!
//! ## Example
//!
//! ```rust
//! use replikv_core::persistence::{SnapshotSink, SnapshotStore};
//! use replikv_persistence::{InMemorySnapshotStore, SnapshotStoreConfig};
//! use tokio::io::AsyncReadExt;
//!
//! # tokio_test::block_on(async {
//! let store = InMemorySnapshotStore::new(SnapshotStoreConfig::default());
//!
//! let mut sink = store.create().await.unwrap();
//! sink.write(b"{\"hello\":\"world\"}").await.unwrap();
//! let meta = sink.close().await.unwrap();
//!
//! let (latest, mut source) = store.open_latest().await.unwrap().unwrap();
//! assert_eq!(latest.id, meta.id);
//!
//! let mut data = Vec::new();
//! source.read_to_end(&mut data).await.unwrap();
//! assert_eq!(data, b"{\"hello\":\"world\"}");
//! # });
//! ```

pub mod config;
pub mod file_system;
pub mod in_memory;
mod tests;

pub use config::SnapshotStoreConfig;
pub use file_system::FileSnapshotStore;
pub use in_memory::InMemorySnapshotStore;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Ids sort by sequence when compared as strings.
pub(crate) fn snapshot_id(sequence: u64) -> String {
    format!("{:020}-{}", sequence, Uuid::new_v4().simple())
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
