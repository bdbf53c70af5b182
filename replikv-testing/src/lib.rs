pub mod cluster;
pub mod workload;

pub use cluster::{SimulatedCluster, SimulatedNode, SnapshotPoint};
pub use workload::WorkloadGenerator;

/// Installs a WARN-level subscriber once per test binary.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}
