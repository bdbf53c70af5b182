//! # Core Types
//!
//! Fundamental types delivered by the consensus engine.

use crate::{Command, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A committed unit of replicated data.
///
/// The consensus engine assigns `index` and delivers entries to the state
/// machine exactly once, in strictly increasing index order. Entries are
/// immutable once delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: u64,
    pub data: Bytes,
}

impl Entry {
    pub fn new(index: u64, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }

    /// Creates an entry whose payload is the encoded `command`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use replikv_core::{Command, Entry};
    ///
    /// let entry = Entry::from_command(1, &Command::get("k")).unwrap();
    /// assert_eq!(entry.index, 1);
    /// assert_eq!(entry.command().unwrap(), Command::get("k"));
    /// ```
    pub fn from_command(index: u64, command: &Command) -> Result<Self> {
        Ok(Self::new(index, command.encode()?))
    }

    /// Decodes the payload.
    pub fn command(&self) -> Result<Command> {
        Command::decode(&self.data)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
