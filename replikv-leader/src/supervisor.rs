//! Single-slot supervision of role workers.
//!
//! The supervisor owns at most one [`WorkerHandle`]. Starting a worker for a
//! new role always cancels the current one and waits for it to acknowledge
//! before anything new is spawned.

use crate::worker::WorkerFactory;
use crate::{LeaderError, LeaderResult, Role};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Ownership of one running role worker.
#[derive(Debug)]
pub struct WorkerHandle {
    id: Uuid,
    role: Role,
    token: CancellationToken,
    done: oneshot::Receiver<()>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// Counters kept by the supervisor
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SupervisorStats {
    pub workers_started: u64,
    pub workers_stopped: u64,
    pub worker_failures: u64,
    pub unacknowledged_cancellations: u64,
}

pub struct WorkerSupervisor {
    factory: Arc<dyn WorkerFactory>,
    parent: CancellationToken,
    ack_timeout: Duration,
    current: Option<WorkerHandle>,
    stats: SupervisorStats,
    failures: Arc<AtomicU64>,
}

impl WorkerSupervisor {
    /// Every worker token is a child of `parent`, so cancelling `parent`
    /// reaches the running worker without going through the supervisor.
    pub fn new(
        factory: Arc<dyn WorkerFactory>,
        parent: CancellationToken,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            parent,
            ack_timeout,
            current: None,
            stats: SupervisorStats::default(),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn current_role(&self) -> Option<Role> {
        self.current.as_ref().map(WorkerHandle::role)
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            worker_failures: self.failures.load(Ordering::Relaxed),
            ..self.stats.clone()
        }
    }

    /// Stops the running worker, then starts the worker for `role`.
    ///
    /// A stop failure is returned after the new worker has been started; the
    /// old task is gone either way.
    pub async fn switch_to(&mut self, role: Role) -> LeaderResult<()> {
        let stopped = self.stop_current().await;
        self.start(role);
        stopped
    }

    /// Cancels the running worker and waits for its acknowledgment.
    ///
    /// A worker that does not acknowledge within the configured bound is
    /// aborted and reported as [`LeaderError::AckTimeout`].
    pub async fn stop_current(&mut self) -> LeaderResult<()> {
        let Some(mut handle) = self.current.take() else {
            return Ok(());
        };

        debug!(worker = %handle.id, "Cancelling {} worker", handle.role);
        handle.token.cancel();

        match tokio::time::timeout(self.ack_timeout, &mut handle.done).await {
            Ok(Ok(())) => {
                if let Err(e) = handle.task.await {
                    debug!(worker = %handle.id, "Worker task ended abnormally after ack: {}", e);
                }
                self.stats.workers_stopped += 1;
                info!(worker = %handle.id, "{} worker stopped", handle.role);
                Ok(())
            }
            Ok(Err(_)) => {
                // the ack sender was dropped without sending: the worker panicked
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.stats.workers_stopped += 1;
                let err = LeaderError::AckLost { role: handle.role };
                warn!(worker = %handle.id, "{}", err);
                Err(err)
            }
            Err(_) => {
                handle.task.abort();
                if let Err(e) = handle.task.await {
                    debug!(worker = %handle.id, "Aborted worker task: {}", e);
                }
                self.stats.unacknowledged_cancellations += 1;
                let err = LeaderError::AckTimeout {
                    role: handle.role,
                    waited: self.ack_timeout,
                };
                error!(worker = %handle.id, "{}", err);
                Err(err)
            }
        }
    }

    fn start(&mut self, role: Role) {
        let Some(worker) = self.factory.create(role) else {
            debug!("No worker for role {}", role);
            return;
        };

        let id = Uuid::new_v4();
        let token = self.parent.child_token();
        let (done_tx, done) = oneshot::channel();
        let failures = Arc::clone(&self.failures);
        let span = info_span!("worker", role = %role, worker = %id);

        let worker_token = token.clone();
        let task = tokio::spawn(
            async move {
                if let Err(e) = worker.run(worker_token).await {
                    failures.fetch_add(1, Ordering::Relaxed);
                    let err = LeaderError::WorkerFailed {
                        role,
                        reason: format!("{:#}", e),
                    };
                    error!("{}", err);
                }
                // the supervisor may have given up waiting already
                let _ = done_tx.send(());
            }
            .instrument(span),
        );

        self.stats.workers_started += 1;
        info!(worker = %id, "{} worker started", role);
        self.current = Some(WorkerHandle {
            id,
            role,
            token,
            done,
            task,
        });
    }
}
