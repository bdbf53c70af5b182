//! In-process stand-in for the external consensus engine.
//!
//! A single ordered log is shared by every node. Committing an entry applies
//! it synchronously to every connected node in log order, so tests can
//! compare replicas without waiting on replication. Roles, election signals
//! and observations are driven explicitly by the test.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use replikv_core::persistence::{SnapshotMeta, SnapshotStore};
use replikv_core::state_machine::{ApplyResponse, StateMachine, StateSnapshot};
use replikv_core::{
    Entry, Observation, Proposal, Proposer, RaftRole, ReplikvError, Result, RoleSource,
};
use replikv_kvstore::{KvService, KvStateMachine, ServiceConfig, StateMachineConfig};
use replikv_leader::MonitorInputs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SIGNAL_BUFFER: usize = 64;

/// Log position a persisted snapshot corresponds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPoint {
    pub meta: SnapshotMeta,
    pub index: u64,
}

/// One member of a [`SimulatedCluster`].
pub struct SimulatedNode {
    id: String,
    machine: Arc<KvStateMachine>,
    role: RwLock<RaftRole>,
    applied: AtomicU64,
    connected: AtomicBool,
    leader: Arc<RwLock<Option<String>>>,
    elections: Mutex<Option<mpsc::Sender<bool>>>,
    observations: Mutex<Option<mpsc::Sender<Observation>>>,
}

impl SimulatedNode {
    fn new(id: &str, machine: KvStateMachine, leader: Arc<RwLock<Option<String>>>) -> Self {
        Self {
            id: id.to_string(),
            machine: Arc::new(machine),
            role: RwLock::new(RaftRole::Follower),
            applied: AtomicU64::new(0),
            connected: AtomicBool::new(true),
            leader,
            elections: Mutex::new(None),
            observations: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn machine(&self) -> &Arc<KvStateMachine> {
        &self.machine
    }

    /// Highest log index applied on this node.
    pub fn applied_index(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Wires a leadership monitor to this node's role signals.
    ///
    /// Calling it again replaces the previous channels.
    pub fn monitor_inputs(&self) -> MonitorInputs {
        let (election_tx, elections) = mpsc::channel(SIGNAL_BUFFER);
        let (observation_tx, observations) = mpsc::channel(SIGNAL_BUFFER);
        *self.elections.lock() = Some(election_tx);
        *self.observations.lock() = Some(observation_tx);
        MonitorInputs {
            elections,
            observations,
        }
    }

    fn set_role(&self, role: RaftRole) -> RaftRole {
        std::mem::replace(&mut *self.role.write(), role)
    }

    fn signal_election(&self, elected: bool) {
        if let Some(tx) = self.elections.lock().as_ref() {
            if tx.try_send(elected).is_err() {
                warn!("Dropped election signal for {}", self.id);
            }
        }
    }

    fn observe(&self, observation: Observation) {
        if let Some(tx) = self.observations.lock().as_ref() {
            if tx.try_send(observation).is_err() {
                debug!("Dropped observation for {}", self.id);
            }
        }
    }

    /// Applies every entry past the node's applied index. Returns the
    /// response of the last entry applied, if any.
    fn catch_up(&self, log: &[Entry]) -> Option<ApplyResponse> {
        let applied = self.applied_index() as usize;
        let mut last = None;
        for entry in log.iter().skip(applied) {
            last = Some(self.machine.apply(entry));
            self.applied.store(entry.index, Ordering::SeqCst);
        }
        last
    }
}

impl RoleSource for SimulatedNode {
    fn role(&self) -> RaftRole {
        *self.role.read()
    }

    fn leader(&self) -> Option<String> {
        self.leader.read().clone()
    }
}

struct ClusterInner {
    nodes: DashMap<String, Arc<SimulatedNode>>,
    log: Mutex<Vec<Entry>>,
    leader: Arc<RwLock<Option<String>>>,
    snapshot_index: DashMap<String, u64>,
    commit_latency: RwLock<Duration>,
}

impl ClusterInner {
    fn node(&self, id: &str) -> Result<Arc<SimulatedNode>> {
        self.nodes
            .get(id)
            .map(|node| Arc::clone(node.value()))
            .ok_or_else(|| ReplikvError::internal(format!("unknown node {}", id)))
    }

    fn commit(&self, origin: &str, data: Bytes) -> Result<Proposal> {
        let mut log = self.log.lock();
        let index = log.len() as u64 + 1;
        log.push(Entry::new(index, data));

        let mut response = None;
        for node in self.nodes.iter() {
            if !node.is_connected() {
                continue;
            }
            let applied = node.catch_up(&log);
            if node.id == origin {
                response = applied;
            }
        }

        match response {
            Some(Ok(response)) => Ok(Proposal { index, response }),
            Some(Err(e)) => Err(e),
            None => Err(ReplikvError::consensus(format!(
                "entry {} was not applied on {}",
                index, origin
            ))),
        }
    }
}

/// Simulated consensus engine shared by a set of nodes.
#[derive(Clone)]
pub struct SimulatedCluster {
    inner: Arc<ClusterInner>,
}

impl SimulatedCluster {
    /// Creates `size` followers named `node-1` .. `node-N` with no leader.
    pub fn new(size: usize) -> Self {
        let cluster = Self {
            inner: Arc::new(ClusterInner {
                nodes: DashMap::new(),
                log: Mutex::new(Vec::new()),
                leader: Arc::new(RwLock::new(None)),
                snapshot_index: DashMap::new(),
                commit_latency: RwLock::new(Duration::ZERO),
            }),
        };
        for i in 1..=size {
            let id = format!("node-{}", i);
            let machine = KvStateMachine::new(StateMachineConfig::new(id.as_str()));
            cluster.insert(SimulatedNode::new(
                &id,
                machine,
                Arc::clone(&cluster.inner.leader),
            ));
        }
        cluster
    }

    fn insert(&self, node: SimulatedNode) {
        self.inner.nodes.insert(node.id.clone(), Arc::new(node));
    }

    pub fn node(&self, id: &str) -> Option<Arc<SimulatedNode>> {
        self.inner.node(id).ok()
    }

    /// Node ids in name order.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.nodes.iter().map(|n| n.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn leader(&self) -> Option<String> {
        self.inner.leader.read().clone()
    }

    pub fn last_index(&self) -> u64 {
        self.inner.log.lock().len() as u64
    }

    /// Delay between a proposal and its commit.
    pub fn set_commit_latency(&self, latency: Duration) {
        *self.inner.commit_latency.write() = latency;
    }

    pub fn proposer(&self, id: &str) -> Arc<dyn Proposer> {
        Arc::new(NodeProposer {
            cluster: Arc::clone(&self.inner),
            node_id: id.to_string(),
        })
    }

    pub fn service(&self, id: &str, config: ServiceConfig) -> KvService {
        KvService::new(self.proposer(id), config)
    }

    /// Makes `id` the leader and every other live node a follower.
    ///
    /// Election signals go only to nodes whose leadership status changed;
    /// every node observes the new leader and its own role.
    pub fn elect(&self, id: &str) -> Result<()> {
        self.inner.node(id)?;
        *self.inner.leader.write() = Some(id.to_string());
        info!("Electing {}", id);

        for node in self.inner.nodes.iter() {
            let next = if node.id == id {
                RaftRole::Leader
            } else {
                RaftRole::Follower
            };
            if node.role() == RaftRole::Shutdown {
                continue;
            }
            let previous = node.set_role(next);

            match (previous, next) {
                (RaftRole::Leader, RaftRole::Leader) => {}
                (_, RaftRole::Leader) => node.signal_election(true),
                (RaftRole::Leader, _) => node.signal_election(false),
                _ => {}
            }
            node.observe(Observation::LeaderChanged {
                leader: Some(id.to_string()),
            });
            if previous != next {
                node.observe(Observation::RoleChanged(next));
            }
        }
        Ok(())
    }

    /// Moves the current leader to candidate, leaving the cluster leaderless.
    pub fn step_down(&self) {
        let Some(id) = self.inner.leader.write().take() else {
            return;
        };
        if let Ok(node) = self.inner.node(&id) {
            node.set_role(RaftRole::Candidate);
            node.signal_election(false);
            node.observe(Observation::RoleChanged(RaftRole::Candidate));
        }
        for node in self.inner.nodes.iter() {
            node.observe(Observation::LeaderChanged { leader: None });
        }
    }

    /// Puts the engine of `id` into the shutdown state.
    pub fn shutdown(&self, id: &str) -> Result<()> {
        let node = self.inner.node(id)?;
        node.set_role(RaftRole::Shutdown);
        node.observe(Observation::RoleChanged(RaftRole::Shutdown));
        let mut leader = self.inner.leader.write();
        if leader.as_deref() == Some(id) {
            *leader = None;
        }
        Ok(())
    }

    /// Stops delivering entries to `id` until [`reconnect`](Self::reconnect).
    pub fn disconnect(&self, id: &str) -> Result<()> {
        self.inner.node(id)?.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Reconnects `id` and replays the entries it missed.
    pub fn reconnect(&self, id: &str) -> Result<()> {
        let node = self.inner.node(id)?;
        let log = self.inner.log.lock();
        node.connected.store(true, Ordering::SeqCst);
        node.catch_up(&log);
        Ok(())
    }

    /// Snapshots the state machine of `id` into `store`.
    ///
    /// The snapshot is taken with the log locked so the recorded index is
    /// exactly the last entry the copy includes.
    pub async fn snapshot(&self, id: &str, store: &dyn SnapshotStore) -> Result<SnapshotPoint> {
        let node = self.inner.node(id)?;
        let (snapshot, index) = {
            let _log = self.inner.log.lock();
            (node.machine.snapshot()?, node.applied_index())
        };

        let sink = store.create().await?;
        let meta = snapshot.persist(sink).await?;
        snapshot.release();

        self.inner.snapshot_index.insert(meta.id.clone(), index);
        Ok(SnapshotPoint { meta, index })
    }

    /// Adds node `id`, bootstrapped from the newest snapshot in `store` and
    /// then caught up from the log.
    pub async fn join_from_snapshot(
        &self,
        id: &str,
        store: &dyn SnapshotStore,
    ) -> Result<Arc<SimulatedNode>> {
        let (meta, source) = store
            .open_latest()
            .await?
            .ok_or_else(|| ReplikvError::restore_io("no snapshot to bootstrap from"))?;
        let index = self
            .inner
            .snapshot_index
            .get(&meta.id)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                ReplikvError::restore_io(format!("snapshot {} was not taken by this cluster", meta.id))
            })?;

        let machine = KvStateMachine::new(StateMachineConfig::new(id));
        machine.restore(source).await?;

        let node = SimulatedNode::new(id, machine, Arc::clone(&self.inner.leader));
        node.applied.store(index, Ordering::SeqCst);
        {
            let log = self.inner.log.lock();
            node.catch_up(&log);
            self.insert(node);
        }
        info!("{} joined from snapshot {} at index {}", id, meta.id, index);
        self.inner.node(id)
    }
}

struct NodeProposer {
    cluster: Arc<ClusterInner>,
    node_id: String,
}

#[async_trait]
impl Proposer for NodeProposer {
    async fn propose(&self, data: Bytes, timeout: Duration) -> Result<Proposal> {
        let node = self.cluster.node(&self.node_id)?;
        if node.role() != RaftRole::Leader {
            return Err(ReplikvError::not_leader(node.leader()));
        }

        let latency = *self.cluster.commit_latency.read();
        tokio::time::timeout(timeout, async {
            tokio::time::sleep(latency).await;
            self.cluster.commit(&self.node_id, data)
        })
        .await
        .map_err(|_| ReplikvError::timeout("propose"))?
    }
}
