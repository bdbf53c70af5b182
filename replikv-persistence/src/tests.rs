#[cfg(test)]
mod unit_tests {
    use crate::{FileSnapshotStore, InMemorySnapshotStore, SnapshotStoreConfig};
    use replikv_core::persistence::{SnapshotMeta, SnapshotSink, SnapshotStore};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn save(store: &dyn SnapshotStore, data: &[u8]) -> SnapshotMeta {
        let mut sink = store.create().await.unwrap();
        // two writes to make sure the sink appends
        let (head, tail) = data.split_at(data.len() / 2);
        sink.write(head).await.unwrap();
        sink.write(tail).await.unwrap();
        sink.close().await.unwrap()
    }

    async fn read(store: &dyn SnapshotStore, id: &str) -> Vec<u8> {
        let mut source = store.open(id).await.unwrap();
        let mut data = Vec::new();
        source.read_to_end(&mut data).await.unwrap();
        data
    }

    async fn check_store(store: &dyn SnapshotStore) {
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.open_latest().await.unwrap().is_none());

        let first = save(store, b"first snapshot").await;
        let second = save(store, b"second snapshot").await;
        assert!(second.sequence > first.sequence);
        assert_eq!(second.size, b"second snapshot".len() as u64);

        let listed = store.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|meta| meta.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert_eq!(read(store, &first.id).await, b"first snapshot");

        let (latest, mut source) = store.open_latest().await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        let mut data = Vec::new();
        source.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"second snapshot");
    }

    async fn check_retention(store: &dyn SnapshotStore) {
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(save(store, format!("snapshot {}", i).as_bytes()).await.id);
        }

        let listed: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|meta| meta.id)
            .collect();
        assert_eq!(listed, vec![ids[3].clone(), ids[2].clone()]);
        assert!(store.open(&ids[0]).await.is_err());
    }

    async fn check_cancel(store: &dyn SnapshotStore) {
        let kept = save(store, b"kept").await;

        let mut sink = store.create().await.unwrap();
        sink.write(b"half written").await.unwrap();
        let cancelled = sink.id().to_string();
        sink.cancel().await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);
        assert!(store.open(&cancelled).await.is_err());
    }

    async fn check_zero_retain_keeps_latest(store: &dyn SnapshotStore) {
        save(store, b"older").await;
        let latest = save(store, b"latest").await;

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, latest.id);
        assert_eq!(read(store, &latest.id).await, b"latest");
    }

    #[tokio::test]
    async fn test_zero_retain_keeps_latest_snapshot() {
        let config = SnapshotStoreConfig::default().with_retain(0);
        check_zero_retain_keeps_latest(&InMemorySnapshotStore::new(config.clone())).await;

        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path(), config).await.unwrap();
        check_zero_retain_keeps_latest(&store).await;
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySnapshotStore::new(SnapshotStoreConfig::default());
        check_store(&store).await;
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_retention() {
        check_retention(&InMemorySnapshotStore::new(SnapshotStoreConfig::default())).await;
    }

    #[tokio::test]
    async fn test_in_memory_cancel() {
        check_cancel(&InMemorySnapshotStore::default()).await;
    }

    #[tokio::test]
    async fn test_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path(), SnapshotStoreConfig::default())
            .await
            .unwrap();
        check_store(&store).await;
    }

    #[tokio::test]
    async fn test_file_store_retention() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path(), SnapshotStoreConfig::default())
            .await
            .unwrap();
        check_retention(&store).await;
    }

    #[tokio::test]
    async fn test_file_store_cancel_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path(), SnapshotStoreConfig::default())
            .await
            .unwrap();
        check_cancel(&store).await;

        let files = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let config = SnapshotStoreConfig::default().with_retain(3);

        let store = FileSnapshotStore::new(temp_dir.path(), config.clone())
            .await
            .unwrap();
        let saved = save(&store, b"persistent state").await;

        // a crash mid-write leaves a partial file behind
        let mut abandoned = store.create().await.unwrap();
        abandoned.write(b"torn").await.unwrap();
        drop(abandoned);

        let reopened = FileSnapshotStore::new(temp_dir.path(), config).await.unwrap();
        let listed = reopened.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, saved.id);
        assert_eq!(read(&reopened, &saved.id).await, b"persistent state");

        let next = save(&reopened, b"after restart").await;
        assert!(next.sequence > saved.sequence);
        let partials = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
            .count();
        assert_eq!(partials, 0);
    }

    #[tokio::test]
    async fn test_file_store_rejects_foreign_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path(), SnapshotStoreConfig::default())
            .await
            .unwrap();
        assert!(store.open("../../etc/passwd").await.is_err());
    }
}
