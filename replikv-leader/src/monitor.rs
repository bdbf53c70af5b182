//! The leadership monitor coordination loop.
//!
//! One task multiplexes the election channel, the observation stream, a poll
//! timer and the outer cancellation token. It is the only writer of the
//! node's [`Role`], which it publishes on a `watch` channel after each
//! transition, and it drives the [`WorkerSupervisor`] so that at most one
//! role worker is alive at any time.

use crate::reconcile::{is_duplicate, reconcile, Signal};
use crate::supervisor::WorkerSupervisor;
use crate::worker::WorkerFactory;
use crate::{LeaderResult, Role};
use replikv_core::{Observation, RaftRole, RoleSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Configuration for the leadership monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Identifier attached to every log line of this monitor
    pub node_id: String,

    /// How often the engine's role is polled directly
    pub poll_interval: Duration,

    /// Bound on waiting for a cancelled worker to acknowledge
    pub ack_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            node_id: "local".to_string(),
            poll_interval: Duration::from_millis(500),
            ack_timeout: Duration::from_secs(5),
        }
    }
}

impl MonitorConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }
}

/// Statistics reported when the monitor exits
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorStats {
    pub transitions: u64,
    pub workers_started: u64,
    pub workers_stopped: u64,
    pub worker_failures: u64,
    pub duplicate_signals: u64,
    pub unacknowledged_cancellations: u64,
    pub observations: u64,
}

/// Asynchronous role signals produced by the consensus engine.
pub struct MonitorInputs {
    /// `true` when this node became leader, `false` when it lost leadership
    pub elections: mpsc::Receiver<bool>,
    pub observations: mpsc::Receiver<Observation>,
}

pub struct LeadershipMonitor {
    config: MonitorConfig,
    engine: Arc<dyn RoleSource>,
    factory: Arc<dyn WorkerFactory>,
    role: Role,
    role_tx: watch::Sender<Role>,
    stats: MonitorStats,
    span: Span,
}

impl LeadershipMonitor {
    pub fn new(
        config: MonitorConfig,
        engine: Arc<dyn RoleSource>,
        factory: Arc<dyn WorkerFactory>,
    ) -> Self {
        let (role_tx, _) = watch::channel(Role::Initial);
        let span = info_span!("leadership", node = %config.node_id);
        Self {
            config,
            engine,
            factory,
            role: Role::Initial,
            role_tx,
            stats: MonitorStats::default(),
            span,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Stream of authoritative role changes.
    pub fn subscribe(&self) -> watch::Receiver<Role> {
        self.role_tx.subscribe()
    }

    /// Runs the monitor on its own task.
    pub fn spawn(self, inputs: MonitorInputs, shutdown: CancellationToken) -> MonitorHandle {
        let roles = self.subscribe();
        let task = tokio::spawn(self.run(inputs, shutdown));
        MonitorHandle { roles, task }
    }

    /// Processes role signals until the monitor enters [`Role::Exiting`].
    ///
    /// Returns once the last worker has been cancelled and awaited.
    pub async fn run(mut self, inputs: MonitorInputs, shutdown: CancellationToken) -> MonitorStats {
        let span = self.span.clone();
        async move {
            let mut supervisor = WorkerSupervisor::new(
                Arc::clone(&self.factory),
                shutdown.child_token(),
                self.config.ack_timeout,
            );
            self.coordinate(inputs, &shutdown, &mut supervisor).await;

            let workers = supervisor.stats();
            self.stats.workers_started = workers.workers_started;
            self.stats.workers_stopped = workers.workers_stopped;
            self.stats.worker_failures = workers.worker_failures;
            self.stats.unacknowledged_cancellations = workers.unacknowledged_cancellations;

            info!(
                "Leadership monitor exited after {} transitions",
                self.stats.transitions
            );
            self.stats
        }
        .instrument(span)
        .await
    }

    async fn coordinate(
        &mut self,
        inputs: MonitorInputs,
        shutdown: &CancellationToken,
        supervisor: &mut WorkerSupervisor,
    ) {
        let MonitorInputs {
            elections,
            observations,
        } = inputs;
        let mut elections = Some(elections);
        let mut observations = Some(observations);

        let period = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Leadership monitor started");

        while !self.role.is_terminal() {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    self.enter(Role::Exiting, supervisor).await;
                }
                elected = recv_or_pending(&mut elections) => match elected {
                    Some(elected) => {
                        debug!("Election signal received (elected: {})", elected);
                        self.on_signal(Signal::Elected(elected), supervisor).await;
                    }
                    None => {
                        debug!("Election channel closed");
                        elections = None;
                    }
                },
                observation = recv_or_pending(&mut observations) => match observation {
                    Some(observation) => self.on_observation(observation, supervisor).await,
                    None => {
                        debug!("Observation channel closed");
                        observations = None;
                    }
                },
                _ = ticker.tick() => {
                    self.on_signal(Signal::Poll, supervisor).await;
                }
            }
        }
    }

    async fn on_signal(&mut self, signal: Signal, supervisor: &mut WorkerSupervisor) {
        let observed = self.engine.role();

        match reconcile(self.role, signal, observed) {
            Some(next) => self.enter(next, supervisor).await,
            None if is_duplicate(self.role, signal) => {
                self.stats.duplicate_signals += 1;
                debug!("Ignoring duplicate {:?} while {}", signal, self.role);
            }
            None => match (signal, observed) {
                (Signal::Elected(elected), _) => debug!(
                    "Election signal (elected: {}) not confirmed, engine reports {}",
                    elected, observed
                ),
                (Signal::Poll, RaftRole::Candidate) => {
                    debug!("Node is a candidate")
                }
                (Signal::Poll, _) => {}
            },
        }
    }

    async fn on_observation(&mut self, observation: Observation, supervisor: &mut WorkerSupervisor) {
        self.stats.observations += 1;
        match observation {
            Observation::PeerAdded { id, address } => {
                info!("Peer {} added at {}", id, address)
            }
            Observation::PeerRemoved { id, address } => {
                info!("Peer {} at {} removed", id, address)
            }
            Observation::LeaderChanged { leader } => {
                info!(
                    "Cluster leader is now {}",
                    leader.as_deref().unwrap_or("unknown")
                )
            }
            Observation::RequestVote {
                candidate,
                term,
                leadership_transfer,
            } => debug!(
                "Vote requested by {} for term {} (leadership transfer: {})",
                candidate, term, leadership_transfer
            ),
            Observation::RoleChanged(raft_role) => {
                debug!("Engine reports role {}", raft_role);
                self.on_signal(Signal::Poll, supervisor).await;
            }
            Observation::Other(description) => warn!("Unhandled observation: {}", description),
        }
    }

    async fn enter(&mut self, next: Role, supervisor: &mut WorkerSupervisor) {
        let previous = self.role;
        if let Err(e) = previous.transition(next) {
            warn!("{}", e);
            return;
        }

        info!("Role transition {} -> {}", previous, next);
        self.role = next;
        self.stats.transitions += 1;

        let outcome = if next.has_worker() {
            supervisor.switch_to(next).await
        } else {
            supervisor.stop_current().await
        };
        if let Err(e) = outcome {
            warn!("Worker supervision anomaly during {} -> {}: {}", previous, next, e);
        }

        self.role_tx.send_replace(next);
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// A monitor running on its own task.
pub struct MonitorHandle {
    roles: watch::Receiver<Role>,
    task: JoinHandle<MonitorStats>,
}

impl MonitorHandle {
    pub fn role(&self) -> Role {
        *self.roles.borrow()
    }

    pub fn roles(&self) -> watch::Receiver<Role> {
        self.roles.clone()
    }

    /// Waits for the monitor to exit.
    pub async fn join(self) -> LeaderResult<MonitorStats> {
        Ok(self.task.await?)
    }
}
