use crate::{now_millis, snapshot_id, SnapshotStoreConfig};
use async_trait::async_trait;
use replikv_core::persistence::{SnapshotMeta, SnapshotSink, SnapshotStore};
use replikv_core::state_machine::SnapshotSource;
use replikv_core::{ReplikvError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, info_span, warn, Span};

const SNAPSHOT_EXTENSION: &str = "snap";
const PARTIAL_EXTENSION: &str = "tmp";

/// Snapshot store backed by a directory.
///
/// Each snapshot is written to a temporary file and renamed into place when
/// its sink closes, so a crash mid-write never leaves a listed but truncated
/// snapshot behind.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    config: SnapshotStoreConfig,
    next_sequence: Arc<AtomicU64>,
    span: Span,
}

impl FileSnapshotStore {
    /// Opens the store rooted at `dir`, creating the directory if needed.
    ///
    /// Partial snapshots left by an earlier crash are removed, and sequence
    /// numbering resumes after the newest complete snapshot.
    pub async fn new<P: AsRef<Path>>(dir: P, config: SnapshotStoreConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let span = info_span!("snapshot_store", dir = %dir.display());

        fs::create_dir_all(&dir).await.map_err(|e| {
            ReplikvError::snapshot_io(format!("Failed to create snapshot directory: {}", e))
        })?;

        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            ReplikvError::snapshot_io(format!("Failed to read snapshot directory: {}", e))
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ReplikvError::snapshot_io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(PARTIAL_EXTENSION) {
                warn!(parent: &span, "Removing partial snapshot {}", path.display());
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(parent: &span, "Failed to remove {}: {}", path.display(), e);
                }
            }
        }

        let latest = list_snapshots(&dir)
            .await?
            .first()
            .map(|meta| meta.sequence)
            .unwrap_or(0);
        info!(parent: &span, "Snapshot store opened, latest sequence {}", latest);

        Ok(Self {
            dir,
            config,
            next_sequence: Arc::new(AtomicU64::new(latest)),
            span,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn create(&self) -> Result<Box<dyn SnapshotSink>> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = snapshot_id(sequence);
        let partial = self.dir.join(format!("{}.{}", id, PARTIAL_EXTENSION));
        let file = fs::File::create(&partial).await.map_err(|e| {
            ReplikvError::snapshot_io(format!("Failed to create snapshot file: {}", e))
        })?;

        debug!(parent: &self.span, "Creating snapshot {}", id);
        Ok(Box::new(FileSink {
            id,
            sequence,
            file,
            partial,
            dir: self.dir.clone(),
            written: 0,
            retain: self.config.retain(),
            span: self.span.clone(),
        }))
    }

    async fn list(&self) -> Result<Vec<SnapshotMeta>> {
        list_snapshots(&self.dir).await
    }

    async fn open(&self, id: &str) -> Result<SnapshotSource> {
        if parse_sequence(id).is_none() {
            return Err(ReplikvError::restore_io(format!(
                "invalid snapshot id {}",
                id
            )));
        }
        let path = complete_path(&self.dir, id);
        let file = fs::File::open(&path).await.map_err(|e| {
            ReplikvError::restore_io(format!("Failed to open snapshot {}: {}", id, e))
        })?;
        Ok(Box::new(file))
    }
}

struct FileSink {
    id: String,
    sequence: u64,
    file: fs::File,
    partial: PathBuf,
    dir: PathBuf,
    written: u64,
    retain: usize,
    span: Span,
}

#[async_trait]
impl SnapshotSink for FileSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf).await.map_err(|e| {
            ReplikvError::snapshot_io(format!("Failed to write snapshot {}: {}", self.id, e))
        })?;
        self.written += buf.len() as u64;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<SnapshotMeta> {
        let FileSink {
            id,
            sequence,
            mut file,
            partial,
            dir,
            written,
            retain,
            span,
        } = *self;

        let sync_failed =
            |e: std::io::Error| ReplikvError::snapshot_io(format!("Failed to sync snapshot {}: {}", id, e));
        file.flush().await.map_err(sync_failed)?;
        file.sync_all().await.map_err(sync_failed)?;
        drop(file);

        fs::rename(&partial, complete_path(&dir, &id))
            .await
            .map_err(|e| {
                ReplikvError::snapshot_io(format!("Failed to finalize snapshot {}: {}", id, e))
            })?;
        info!(parent: &span, "Snapshot {} complete ({} bytes)", id, written);

        for stale in list_snapshots(&dir).await?.into_iter().skip(retain) {
            debug!(parent: &span, "Pruning snapshot {}", stale.id);
            if let Err(e) = fs::remove_file(complete_path(&dir, &stale.id)).await {
                warn!(parent: &span, "Failed to prune snapshot {}: {}", stale.id, e);
            }
        }

        Ok(SnapshotMeta {
            id,
            sequence,
            size: written,
            created_at: now_millis(),
        })
    }

    async fn cancel(self: Box<Self>) -> Result<()> {
        let FileSink {
            id,
            file,
            partial,
            span,
            ..
        } = *self;
        drop(file);

        debug!(parent: &span, "Discarding snapshot {}", id);
        fs::remove_file(&partial).await.map_err(|e| {
            ReplikvError::snapshot_io(format!("Failed to discard snapshot {}: {}", id, e))
        })
    }
}

fn complete_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.{}", id, SNAPSHOT_EXTENSION))
}

/// Sequence number encoded in a snapshot id, if the id is well formed.
fn parse_sequence(id: &str) -> Option<u64> {
    let (sequence, suffix) = id.split_once('-')?;
    if sequence.len() != 20 || suffix.is_empty() || suffix.contains(['/', '\\', '.']) {
        return None;
    }
    sequence.parse().ok()
}

async fn list_snapshots(dir: &Path) -> Result<Vec<SnapshotMeta>> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| {
        ReplikvError::snapshot_io(format!("Failed to read snapshot directory: {}", e))
    })?;

    let mut snapshots = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ReplikvError::snapshot_io(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let Some(sequence) = parse_sequence(id) else {
            continue;
        };

        let metadata = entry
            .metadata()
            .await
            .map_err(|e| ReplikvError::snapshot_io(e.to_string()))?;
        let created_at = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);

        snapshots.push(SnapshotMeta {
            id: id.to_string(),
            sequence,
            size: metadata.len(),
            created_at,
        });
    }

    snapshots.sort_by(|a, b| b.sequence.cmp(&a.sequence));
    Ok(snapshots)
}
