//! Leadership integration tests
//!
//! Run one leadership monitor per simulated node and move leadership around
//! the cluster.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use replikv_leader::{
    worker_fn, LeadershipMonitor, MonitorConfig, MonitorHandle, Role, RoleWorker,
    TickingWorkerFactory, WorkerConfig, WorkerFactory,
};
use replikv_testing::{init_test_tracing, SimulatedCluster};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CountingFactory {
    alive: Arc<AtomicUsize>,
    max_alive: Arc<AtomicUsize>,
    started: Mutex<Vec<Role>>,
}

impl WorkerFactory for CountingFactory {
    fn create(&self, role: Role) -> Option<Box<dyn RoleWorker>> {
        if !role.has_worker() {
            return None;
        }
        self.started.lock().push(role);
        let alive = Arc::clone(&self.alive);
        let max_alive = Arc::clone(&self.max_alive);
        Some(worker_fn(move |token| async move {
            let now = alive.fetch_add(1, Ordering::SeqCst) + 1;
            max_alive.fetch_max(now, Ordering::SeqCst);
            token.cancelled().await;
            alive.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }))
    }
}

struct MonitoredNode {
    factory: Arc<CountingFactory>,
    handle: MonitorHandle,
}

fn monitor_all(cluster: &SimulatedCluster, shutdown: &CancellationToken) -> Vec<MonitoredNode> {
    cluster
        .node_ids()
        .into_iter()
        .map(|id| {
            let node = cluster.node(&id).unwrap();
            let factory = Arc::new(CountingFactory::default());
            let monitor =
                LeadershipMonitor::new(MonitorConfig::new(id.as_str()), node.clone(), factory.clone());
            let handle = monitor.spawn(node.monitor_inputs(), shutdown.clone());
            MonitoredNode { factory, handle }
        })
        .collect()
}

async fn wait_role(handle: &MonitorHandle, role: Role) {
    let mut roles = handle.roles();
    tokio::time::timeout(Duration::from_secs(10), roles.wait_for(|r| *r == role))
        .await
        .expect("role not reached in time")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_leadership_moves_between_monitors() {
    init_test_tracing();
    let cluster = SimulatedCluster::new(3);
    let shutdown = CancellationToken::new();
    let nodes = monitor_all(&cluster, &shutdown);

    cluster.elect("node-1").unwrap();
    wait_role(&nodes[0].handle, Role::Leader).await;
    // followers never get an election signal; the poll finds them
    wait_role(&nodes[1].handle, Role::Follower).await;
    wait_role(&nodes[2].handle, Role::Follower).await;

    cluster.elect("node-2").unwrap();
    wait_role(&nodes[0].handle, Role::Follower).await;
    wait_role(&nodes[1].handle, Role::Leader).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(nodes[2].handle.role(), Role::Follower);

    shutdown.cancel();
    let mut all_stats = Vec::new();
    for node in nodes {
        let factory = node.factory;
        all_stats.push(node.handle.join().await.unwrap());
        assert_eq!(factory.alive.load(Ordering::SeqCst), 0);
        assert_eq!(factory.max_alive.load(Ordering::SeqCst), 1);
        let started = factory.started.lock().clone();
        assert!(started.windows(2).all(|pair| pair[0] != pair[1]));
    }

    assert_eq!(all_stats[0].workers_started, 2);
    assert_eq!(all_stats[1].workers_started, 2);
    assert_eq!(all_stats[2].workers_started, 1);
    assert!(all_stats.iter().all(|s| s.workers_started == s.workers_stopped));
}

#[tokio::test(start_paused = true)]
async fn test_leaderless_cluster_keeps_last_role() {
    init_test_tracing();
    let cluster = SimulatedCluster::new(2);
    let shutdown = CancellationToken::new();
    let nodes = monitor_all(&cluster, &shutdown);

    cluster.elect("node-1").unwrap();
    wait_role(&nodes[0].handle, Role::Leader).await;

    // demotion is not confirmed while the engine is only a candidate
    cluster.step_down();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(nodes[0].handle.role(), Role::Leader);

    cluster.elect("node-2").unwrap();
    wait_role(&nodes[0].handle, Role::Follower).await;
    wait_role(&nodes[1].handle, Role::Leader).await;

    shutdown.cancel();
    for node in nodes {
        node.handle.join().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_engine_shutdown_stops_monitor() {
    init_test_tracing();
    let cluster = SimulatedCluster::new(2);
    let shutdown = CancellationToken::new();
    let mut nodes = monitor_all(&cluster, &shutdown);

    cluster.elect("node-1").unwrap();
    wait_role(&nodes[0].handle, Role::Leader).await;

    cluster.shutdown("node-1").unwrap();
    let node = nodes.remove(0);
    let stats = tokio::time::timeout(Duration::from_secs(10), node.handle.join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.transitions, 2);
    assert_eq!(node.factory.alive.load(Ordering::SeqCst), 0);
    assert!(!shutdown.is_cancelled());

    shutdown.cancel();
    for node in nodes {
        node.handle.join().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_ticking_workers_run_while_in_role() {
    init_test_tracing();
    let cluster = SimulatedCluster::new(1);
    let node = cluster.node("node-1").unwrap();
    let shutdown = CancellationToken::new();

    let factory = Arc::new(TickingWorkerFactory::new(
        WorkerConfig::default().with_tick_interval(Duration::from_secs(2)),
    ));
    let monitor = LeadershipMonitor::new(MonitorConfig::new("node-1"), node.clone(), factory.clone());
    let handle = monitor.spawn(node.monitor_inputs(), shutdown.clone());

    cluster.elect("node-1").unwrap();
    wait_role(&handle, Role::Leader).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    shutdown.cancel();
    let stats = handle.join().await.unwrap();
    assert_eq!(stats.workers_started, 1);
    assert!(factory.ticks() >= 3);
}
