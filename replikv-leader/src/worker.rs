//! Role-specific background workers.

use crate::Role;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A background task that runs while the node holds one role.
///
/// Implementations must observe `token` often enough that cancellation
/// latency stays bounded, and return promptly once it fires. The supervisor
/// acknowledges completion on the worker's behalf when `run` returns.
#[async_trait]
pub trait RoleWorker: Send + 'static {
    async fn run(self: Box<Self>, token: CancellationToken) -> anyhow::Result<()>;
}

/// Builds the worker for a newly entered role.
pub trait WorkerFactory: Send + Sync {
    /// Returns `None` for roles that run nothing.
    fn create(&self, role: Role) -> Option<Box<dyn RoleWorker>>;
}

/// Adapts an async closure into a [`RoleWorker`].
pub struct FnWorker<F> {
    f: F,
}

/// Wraps `f` as a boxed worker.
///
/// ```rust
/// use replikv_leader::worker::{worker_fn, RoleWorker};
///
/// let worker: Box<dyn RoleWorker> = worker_fn(|token| async move {
///     token.cancelled().await;
///     Ok(())
/// });
/// # drop(worker);
/// ```
pub fn worker_fn<F, Fut>(f: F) -> Box<dyn RoleWorker>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(FnWorker { f })
}

#[async_trait]
impl<F, Fut> RoleWorker for FnWorker<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(self: Box<Self>, token: CancellationToken) -> anyhow::Result<()> {
        (self.f)(token).await
    }
}

/// Configuration for the built-in ticking workers
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tick_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
        }
    }
}

impl WorkerConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// Worker that wakes up every `tick_interval` until cancelled.
pub struct TickingWorker {
    role: Role,
    tick_interval: Duration,
    ticks: Arc<AtomicU64>,
}

impl TickingWorker {
    pub fn new(role: Role, tick_interval: Duration, ticks: Arc<AtomicU64>) -> Self {
        Self {
            role,
            tick_interval,
            ticks,
        }
    }
}

#[async_trait]
impl RoleWorker for TickingWorker {
    async fn run(self: Box<Self>, token: CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.tick_interval);
        info!(
            "{} worker started ticking every {:?}",
            self.role, self.tick_interval
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("{} worker done, exiting", self.role);
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.ticks.fetch_add(1, Ordering::Relaxed);
                    info!("{} worker woken up", self.role);
                }
            }
        }
    }
}

/// Creates a [`TickingWorker`] for leader and follower roles.
#[derive(Debug, Default)]
pub struct TickingWorkerFactory {
    config: WorkerConfig,
    ticks: Arc<AtomicU64>,
}

impl TickingWorkerFactory {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total ticks observed across every worker this factory created.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl WorkerFactory for TickingWorkerFactory {
    fn create(&self, role: Role) -> Option<Box<dyn RoleWorker>> {
        role.has_worker().then(|| {
            Box::new(TickingWorker::new(
                role,
                self.config.tick_interval,
                Arc::clone(&self.ticks),
            )) as Box<dyn RoleWorker>
        })
    }
}
