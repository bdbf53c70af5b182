//! # Replikv KVStore
//!
//! The deterministic replicated state machine of a replikv node and the
//! client-facing service that feeds it through the replicated log.
//!
//! ## Features
//!
//! - **Deterministic Apply**: identical entries produce identical state and results on every replica
//! - **Readers-Writer Locking**: reads share the state lock, mutations take it exclusively
//! - **Consistent Snapshots**: state is copied under the lock and serialized outside it
//! - **Self-Describing Snapshots**: versioned, checksummed envelope any node can restore
//! - **Per-Command Service**: `get`/`set`/`remove`/`list`/`clear` over a `Proposer`
//!
//! ## Example Usage
//!
//! ```rust
//! use replikv_core::Command;
//! use replikv_kvstore::{KvStateMachine, StateMachineConfig};
//!
//! let machine = KvStateMachine::new(StateMachineConfig::new("node-1"));
//! machine.apply_encoded(1, &Command::set("hello", "world")).unwrap();
//!
//! let result = machine.apply_encoded(2, &Command::get("hello")).unwrap();
//! assert_eq!(result.value().unwrap().as_ref(), b"world");
//! ```

pub mod filter;
pub mod machine;
pub mod service;
pub mod snapshot;
pub mod state;

pub use filter::compile_filter;
pub use machine::{KvStateMachine, StateMachineConfig, StateMachineStats};
pub use service::{
    ClearResponse, GetResponse, KvService, ListResponse, RemoveResponse, ServiceConfig,
    SetResponse,
};
pub use snapshot::{decode_snapshot, encode_snapshot, KvSnapshot, SNAPSHOT_FORMAT};
pub use state::KvState;

/// Re-export commonly used types
pub use replikv_core::{Command, CommandResult, Entry};
