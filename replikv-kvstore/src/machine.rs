//! # Replicated State Machine
//!
//! Applies committed commands to the key-value state and produces/restores
//! point-in-time snapshots. Every replica that applies the same entries in
//! the same order ends up with byte-identical state and returns identical
//! results.

use crate::filter::compile_filter;
use crate::snapshot::{decode_snapshot, KvSnapshot};
use crate::state::KvState;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use replikv_core::state_machine::{ApplyResponse, SnapshotSource, StateMachine};
use replikv_core::{Command, CommandResult, Entry, ReplikvError, Result};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, info_span, trace, Instrument, Span};

/// Configuration for the state machine
#[derive(Debug, Clone)]
pub struct StateMachineConfig {
    /// Identifier of the owning node, attached to every log line
    pub node_id: String,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            node_id: "local".to_string(),
        }
    }
}

impl StateMachineConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

/// Counters describing the work done by one state machine instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateMachineStats {
    pub entries_applied: u64,
    pub apply_errors: u64,
    pub last_applied_index: u64,
    pub snapshots_taken: u64,
    pub restores: u64,
}

/// Key-value state machine driven by the consensus engine.
///
/// Writers (`Set`, `Remove`, `Clear`) take the state lock exclusively;
/// readers (`Get`, `List`, and the copy step of `snapshot`) share it.
pub struct KvStateMachine {
    config: StateMachineConfig,
    state: RwLock<KvState>,
    stats: RwLock<StateMachineStats>,
    span: Span,
}

impl KvStateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        let span = info_span!("kv_fsm", node = %config.node_id);
        span.in_scope(|| info!("Creating key-value state machine"));
        Self {
            config,
            state: RwLock::new(KvState::new()),
            stats: RwLock::new(StateMachineStats::default()),
            span,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// Applies a decoded command at `index`.
    pub fn apply_command(&self, index: u64, command: Command) -> Result<CommandResult> {
        let kind = command.kind();
        let result = match command {
            Command::Get { key } => {
                let value = self.state.read().get(&key).cloned().unwrap_or_default();
                CommandResult::Get { key, value, index }
            }
            Command::Set { key, value } => {
                self.state.write().insert(key, value);
                CommandResult::Set { index }
            }
            Command::Remove { key } => {
                let value = self.state.write().remove(&key).unwrap_or_default();
                CommandResult::Remove { key, value, index }
            }
            Command::List { filter } => {
                let filter = compile_filter(filter.as_deref())?;
                let keys = self.state.read().keys(filter.as_ref());
                CommandResult::List { keys, index }
            }
            Command::Clear { key, value } => {
                let previous = {
                    let mut state = self.state.write();
                    let previous = state.get(&key).cloned().unwrap_or_default();
                    state.insert(key.clone(), value);
                    previous
                };
                CommandResult::Clear {
                    key,
                    value: previous,
                    index,
                }
            }
        };
        trace!("Applied {} at index {}", kind, index);
        Ok(result)
    }

    /// Encodes `command` into an entry and runs it through [`StateMachine::apply`].
    pub fn apply_encoded(&self, index: u64, command: &Command) -> Result<CommandResult> {
        let entry = Entry::from_command(index, command)?;
        let response: Bytes = self.apply(&entry)?;
        CommandResult::decode(&response)
    }

    /// Returns a copy of the current state.
    pub fn dump(&self) -> KvState {
        self.state.read().clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    pub fn stats(&self) -> StateMachineStats {
        self.stats.read().clone()
    }

    fn record_apply(&self, index: u64, ok: bool) {
        let mut stats = self.stats.write();
        stats.entries_applied += 1;
        stats.last_applied_index = index;
        if !ok {
            stats.apply_errors += 1;
        }
    }

    fn install(&self, state: KvState) {
        let keys = state.len();
        *self.state.write() = state;
        self.stats.write().restores += 1;
        info!("Snapshot restored: keys={}", keys);
    }
}

#[async_trait]
impl StateMachine for KvStateMachine {
    type Snapshot = KvSnapshot;

    fn apply(&self, entry: &Entry) -> ApplyResponse {
        let _guard = self.span.enter();

        let outcome = entry
            .command()
            .and_then(|command| self.apply_command(entry.index, command))
            .and_then(|result| {
                result.encode().map_err(|e| {
                    ReplikvError::internal(format!("Failed to encode result: {}", e))
                })
            });

        self.record_apply(entry.index, outcome.is_ok());
        if let Err(e) = &outcome {
            error!("Failed to apply entry {}: {}", entry.index, e);
        }
        outcome
    }

    fn snapshot(&self) -> Result<KvSnapshot> {
        let _guard = self.span.enter();

        // Only the copy happens under the lock; serialization is deferred
        // to persist().
        let state = self.state.read().clone();
        self.stats.write().snapshots_taken += 1;
        debug!("Snapshot captured: keys={}", state.len());
        Ok(KvSnapshot::new(state))
    }

    async fn restore(&self, mut source: SnapshotSource) -> Result<()> {
        async move {
            let mut data = Vec::new();
            if let Err(e) = source.read_to_end(&mut data).await {
                error!("Failed to read snapshot stream: {}", e);
                return Err(ReplikvError::restore_io(format!(
                    "Failed to read snapshot stream: {}",
                    e
                )));
            }

            match decode_snapshot(&data) {
                Ok(state) => {
                    self.install(state);
                    Ok(())
                }
                Err(e) => {
                    error!("Failed to restore snapshot: {}", e);
                    Err(e)
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }
}
