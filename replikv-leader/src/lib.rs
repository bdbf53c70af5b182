//! # Replikv Leader
//!
//! Leadership transition monitoring for a replikv node.
//!
//! The consensus engine reports this node's role through three independent
//! sources: an election channel, an observation stream and a directly
//! queryable role accessor. This crate reconciles them into one
//! authoritative [`Role`] and runs exactly one role-specific worker at a time:
//!
//! - Election signals are confirmed against the engine before any transition
//! - A poll timer catches transitions whose election signal never arrived
//! - Duplicate notifications never restart the running worker
//! - The previous worker always acknowledges cancellation before the next starts
//! - Outer cancellation drains the running worker before the monitor exits
//!
//! ```rust
//! use replikv_core::{RaftRole, RoleSource};
//! use replikv_leader::{LeadershipMonitor, MonitorConfig, MonitorInputs, Role, TickingWorkerFactory};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct AlwaysLeader;
//!
//! impl RoleSource for AlwaysLeader {
//!     fn role(&self) -> RaftRole {
//!         RaftRole::Leader
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (elections, election_rx) = mpsc::channel(4);
//! let (_observations, observation_rx) = mpsc::channel(4);
//! let shutdown = CancellationToken::new();
//!
//! let monitor = LeadershipMonitor::new(
//!     MonitorConfig::new("node-1"),
//!     Arc::new(AlwaysLeader),
//!     Arc::new(TickingWorkerFactory::default()),
//! );
//! let handle = monitor.spawn(
//!     MonitorInputs { elections: election_rx, observations: observation_rx },
//!     shutdown.clone(),
//! );
//!
//! elections.send(true).await.unwrap();
//! handle.roles().wait_for(|role| *role == Role::Leader).await.unwrap();
//!
//! shutdown.cancel();
//! let stats = handle.join().await.unwrap();
//! assert_eq!(stats.workers_started, 1);
//! # }
//! ```

pub mod errors;
pub mod monitor;
pub mod reconcile;
pub mod role;
pub mod supervisor;
pub mod worker;

pub use errors::{LeaderError, LeaderResult};
pub use monitor::{LeadershipMonitor, MonitorConfig, MonitorHandle, MonitorInputs, MonitorStats};
pub use reconcile::Signal;
pub use role::Role;
pub use supervisor::{SupervisorStats, WorkerHandle, WorkerSupervisor};
pub use worker::{
    worker_fn, RoleWorker, TickingWorker, TickingWorkerFactory, WorkerConfig, WorkerFactory,
};
