//! # Consensus Engine Contracts
//!
//! The node never implements leader election or log replication itself. It
//! consumes the external consensus engine through the narrow contracts in
//! this module: a role accessor, an observation stream and a proposer.

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The engine's own view of this node's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
    Shutdown,
}

impl fmt::Display for RaftRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RaftRole::Follower => "follower",
            RaftRole::Candidate => "candidate",
            RaftRole::Leader => "leader",
            RaftRole::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Direct, pollable access to the engine's current role.
pub trait RoleSource: Send + Sync {
    fn role(&self) -> RaftRole;

    /// Address of the current leader, when known.
    fn leader(&self) -> Option<String> {
        None
    }
}

/// Diagnostic events emitted by the engine.
///
/// Only [`Observation::RoleChanged`] can drive a role transition; the rest
/// are logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    PeerAdded { id: String, address: String },
    PeerRemoved { id: String, address: String },
    LeaderChanged { leader: Option<String> },
    RequestVote {
        candidate: String,
        term: u64,
        leadership_transfer: bool,
    },
    RoleChanged(RaftRole),
    Other(String),
}

/// A command applied through the replicated log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Log index the entry was committed at
    pub index: u64,
    /// Encoded result returned by the state machine
    pub response: Bytes,
}

/// Submits new entries to the replicated log.
#[async_trait]
pub trait Proposer: Send + Sync {
    /// Appends `data` to the log and waits until it has been applied locally.
    ///
    /// Fails with `NotLeader` on followers, `Timeout` when `timeout` elapses,
    /// and with the state machine's own error when the entry was rejected.
    async fn propose(&self, data: Bytes, timeout: Duration) -> Result<Proposal>;
}
