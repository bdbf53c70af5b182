/// Configuration shared by the snapshot stores
#[derive(Debug, Clone)]
pub struct SnapshotStoreConfig {
    retain: usize,
}

impl Default for SnapshotStoreConfig {
    fn default() -> Self {
        Self { retain: 2 }
    }
}

impl SnapshotStoreConfig {
    /// Keeps the newest `retain` complete snapshots. At least one is always
    /// kept, so closing a sink never prunes the snapshot it just wrote.
    pub fn with_retain(mut self, retain: usize) -> Self {
        self.retain = retain.max(1);
        self
    }

    /// Number of complete snapshots kept; older ones are pruned on close.
    pub fn retain(&self) -> usize {
        self.retain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retain_keeps_at_least_one() {
        assert_eq!(SnapshotStoreConfig::default().retain(), 2);
        assert_eq!(SnapshotStoreConfig::default().with_retain(5).retain(), 5);
        assert_eq!(SnapshotStoreConfig::default().with_retain(0).retain(), 1);
    }
}
