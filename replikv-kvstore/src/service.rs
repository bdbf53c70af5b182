//! # Key-Value Service
//!
//! One entry point per command kind. Each call encodes a [`Command`],
//! submits it to the replicated log through a [`Proposer`], and maps the
//! applied [`CommandResult`] back to a typed response. Network marshaling is
//! left to the transport layer.

use crate::filter::compile_filter;
use bytes::Bytes;
use replikv_core::{Command, CommandKind, CommandResult, Proposer, ReplikvError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Configuration for the service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Deadline handed to the proposer for each submission
    pub apply_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            apply_timeout: Duration::from_secs(1),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse {
    pub key: String,
    pub value: Bytes,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetResponse {
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveResponse {
    pub key: String,
    /// Value held before removal; empty when the key was absent
    pub value: Bytes,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    pub keys: Vec<String>,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearResponse {
    pub key: String,
    /// Value held before it was overwritten
    pub previous: Bytes,
    pub index: u64,
}

/// Client-facing entry points backed by the replicated log.
pub struct KvService {
    proposer: Arc<dyn Proposer>,
    config: ServiceConfig,
}

impl KvService {
    pub fn new(proposer: Arc<dyn Proposer>, config: ServiceConfig) -> Self {
        Self { proposer, config }
    }

    pub async fn get(&self, key: &str) -> Result<GetResponse> {
        match self.submit(Command::get(key)).await? {
            (CommandResult::Get { key, value, .. }, index) => Ok(GetResponse { key, value, index }),
            (other, _) => Err(unexpected(CommandKind::Get, &other)),
        }
    }

    pub async fn set(&self, key: &str, value: impl Into<Bytes>) -> Result<SetResponse> {
        match self.submit(Command::set(key, value)).await? {
            (CommandResult::Set { .. }, index) => Ok(SetResponse { index }),
            (other, _) => Err(unexpected(CommandKind::Set, &other)),
        }
    }

    pub async fn remove(&self, key: &str) -> Result<RemoveResponse> {
        match self.submit(Command::remove(key)).await? {
            (CommandResult::Remove { key, value, .. }, index) => {
                Ok(RemoveResponse { key, value, index })
            }
            (other, _) => Err(unexpected(CommandKind::Remove, &other)),
        }
    }

    /// Lists keys matching `filter`. The pattern is compiled locally first so
    /// an invalid filter never reaches the log.
    pub async fn list(&self, filter: Option<&str>) -> Result<ListResponse> {
        compile_filter(filter)?;
        match self.submit(Command::list(filter)).await? {
            (CommandResult::List { keys, .. }, index) => Ok(ListResponse { keys, index }),
            (other, _) => Err(unexpected(CommandKind::List, &other)),
        }
    }

    pub async fn clear(&self, key: &str, value: impl Into<Bytes>) -> Result<ClearResponse> {
        match self.submit(Command::clear(key, value)).await? {
            (CommandResult::Clear { key, value, .. }, index) => Ok(ClearResponse {
                key,
                previous: value,
                index,
            }),
            (other, _) => Err(unexpected(CommandKind::Clear, &other)),
        }
    }

    async fn submit(&self, command: Command) -> Result<(CommandResult, u64)> {
        let kind = command.kind();
        debug!("Submitting {} command", kind);

        let data = command.encode()?;
        let proposal = self
            .proposer
            .propose(data, self.config.apply_timeout)
            .await
            .map_err(|e| {
                error!("Failed to apply {} command to cluster: {}", kind, e);
                e
            })?;

        let result = CommandResult::decode(&proposal.response).map_err(|e| {
            error!("Failed to decode {} response: {}", kind, e);
            e
        })?;
        Ok((result, proposal.index))
    }
}

fn unexpected(expected: CommandKind, actual: &CommandResult) -> ReplikvError {
    ReplikvError::internal(format!(
        "Expected {} result, got {}",
        expected,
        actual.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KvStateMachine, StateMachineConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use replikv_core::state_machine::StateMachine;
    use replikv_core::{Entry, Proposal};

    /// Single-node log that applies every proposal immediately.
    struct LocalLog {
        machine: KvStateMachine,
        next_index: Mutex<u64>,
        leader: bool,
    }

    impl LocalLog {
        fn new(leader: bool) -> Arc<Self> {
            Arc::new(Self {
                machine: KvStateMachine::new(StateMachineConfig::new("svc-test")),
                next_index: Mutex::new(1),
                leader,
            })
        }
    }

    #[async_trait]
    impl Proposer for LocalLog {
        async fn propose(&self, data: Bytes, _timeout: Duration) -> Result<Proposal> {
            if !self.leader {
                return Err(ReplikvError::not_leader(Some("node-1".to_string())));
            }
            let index = {
                let mut next = self.next_index.lock();
                let index = *next;
                *next += 1;
                index
            };
            let response = self.machine.apply(&Entry::new(index, data))?;
            Ok(Proposal { index, response })
        }
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let service = KvService::new(LocalLog::new(true), ServiceConfig::default());

        let set = service.set("k", "v1").await.unwrap();
        assert_eq!(set.index, 1);

        let get = service.get("k").await.unwrap();
        assert_eq!(get.value.as_ref(), b"v1");
        assert_eq!(get.index, 2);

        let clear = service.clear("k", "v2").await.unwrap();
        assert_eq!(clear.previous.as_ref(), b"v1");

        let list = service.list(None).await.unwrap();
        assert_eq!(list.keys, vec!["k".to_string()]);

        let removed = service.remove("k").await.unwrap();
        assert_eq!(removed.value.as_ref(), b"v2");
        assert_eq!(removed.index, 5);
    }

    #[tokio::test]
    async fn test_invalid_filter_never_reaches_the_log() {
        let log = LocalLog::new(true);
        let service = KvService::new(log.clone(), ServiceConfig::default());

        let err = service.list(Some("[")).await.unwrap_err();
        assert!(matches!(err, ReplikvError::InvalidFilter { .. }));
        assert_eq!(*log.next_index.lock(), 1);
    }

    #[tokio::test]
    async fn test_follower_rejects_with_retriable_error() {
        let service = KvService::new(LocalLog::new(false), ServiceConfig::default());

        let err = service.set("k", "v").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, ReplikvError::NotLeader { leader: Some(_) }));
    }
}
