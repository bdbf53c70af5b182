//! # Command Protocol
//!
//! The tagged request/response envelope exchanged between the client-facing
//! service and the replicated state machine. Both sides travel through the
//! replicated log as JSON, tagged by `"type"`.

use crate::{ReplikvError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant shared by [`Command`] and [`CommandResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Get,
    Set,
    Remove,
    List,
    Clear,
}

impl CommandKind {
    /// Short code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            CommandKind::Get => "GET",
            CommandKind::Set => "SET",
            CommandKind::Remove => "DEL",
            CommandKind::List => "LST",
            CommandKind::Clear => "CLR",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A decoded operation carried by an entry payload.
///
/// # Examples
///
/// ```rust
/// use replikv_core::{Command, CommandKind};
///
/// let command = Command::set("color", "blue");
/// let payload = command.encode().unwrap();
/// let decoded = Command::decode(&payload).unwrap();
/// assert_eq!(decoded.kind(), CommandKind::Set);
/// assert_eq!(decoded, command);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Read the value stored under `key`
    Get { key: String },
    /// Upsert `value` under `key`
    Set { key: String, value: Bytes },
    /// Delete `key`, returning its previous value
    Remove { key: String },
    /// List keys, optionally restricted to those matching a regular expression
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    /// Overwrite `key` with `value`, returning the previous value
    Clear { key: String, value: Bytes },
}

impl Command {
    pub fn get(key: impl Into<String>) -> Self {
        Command::Get { key: key.into() }
    }

    pub fn set(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Command::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Command::Remove { key: key.into() }
    }

    /// Builds a `List` command. An empty filter means "all keys".
    pub fn list(filter: Option<impl Into<String>>) -> Self {
        let filter = filter.map(Into::into).filter(|f: &String| !f.is_empty());
        Command::List { filter }
    }

    pub fn clear(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Command::Clear {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Get { .. } => CommandKind::Get,
            Command::Set { .. } => CommandKind::Set,
            Command::Remove { .. } => CommandKind::Remove,
            Command::List { .. } => CommandKind::List,
            Command::Clear { .. } => CommandKind::Clear,
        }
    }

    /// The key this command targets, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::Get { key }
            | Command::Set { key, .. }
            | Command::Remove { key }
            | Command::Clear { key, .. } => Some(key),
            Command::List { .. } => None,
        }
    }

    /// Check if this command modifies the key-value state
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. } | Command::Remove { .. } | Command::Clear { .. }
        )
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes an entry payload. Any failure is reported as
    /// [`ReplikvError::Malformed`].
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| ReplikvError::malformed(e.to_string()))
    }
}

/// Outcome of applying one command, tagged with the log index it was
/// applied at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandResult {
    /// Value stored under `key`; empty when absent
    Get { key: String, value: Bytes, index: u64 },
    Set { index: u64 },
    /// Previous value of `key`; empty when absent
    Remove { key: String, value: Bytes, index: u64 },
    List { keys: Vec<String>, index: u64 },
    /// Previous value of `key` before it was overwritten
    Clear { key: String, value: Bytes, index: u64 },
}

impl CommandResult {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandResult::Get { .. } => CommandKind::Get,
            CommandResult::Set { .. } => CommandKind::Set,
            CommandResult::Remove { .. } => CommandKind::Remove,
            CommandResult::List { .. } => CommandKind::List,
            CommandResult::Clear { .. } => CommandKind::Clear,
        }
    }

    pub fn index(&self) -> u64 {
        match self {
            CommandResult::Get { index, .. }
            | CommandResult::Set { index }
            | CommandResult::Remove { index, .. }
            | CommandResult::List { index, .. }
            | CommandResult::Clear { index, .. } => *index,
        }
    }

    /// The value carried by `Get`, `Remove` and `Clear` results.
    pub fn value(&self) -> Option<&Bytes> {
        match self {
            CommandResult::Get { value, .. }
            | CommandResult::Remove { value, .. }
            | CommandResult::Clear { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn keys(&self) -> Option<&[String]> {
        match self {
            CommandResult::List { keys, .. } => Some(keys),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_properties() {
        let set = Command::set("k", "v");
        let get = Command::get("k");
        let remove = Command::remove("k");
        let list = Command::list(Some("^k"));
        let clear = Command::clear("k", "v2");

        assert_eq!(set.kind().code(), "SET");
        assert_eq!(get.kind().code(), "GET");
        assert_eq!(remove.kind().code(), "DEL");
        assert_eq!(list.kind().code(), "LST");
        assert_eq!(clear.kind().code(), "CLR");

        assert!(set.is_write());
        assert!(remove.is_write());
        assert!(clear.is_write());
        assert!(!get.is_write());
        assert!(!list.is_write());

        assert_eq!(get.key(), Some("k"));
        assert_eq!(list.key(), None);
    }

    #[test]
    fn test_empty_filter_means_all_keys() {
        assert_eq!(Command::list(Some("")), Command::List { filter: None });
        assert_eq!(Command::list(None::<String>), Command::List { filter: None });
    }

    #[test]
    fn test_wire_format_is_tagged() {
        let payload = Command::get("alpha").encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["type"], "get");
        assert_eq!(json["key"], "alpha");

        let list = Command::list(None::<String>).encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&list).unwrap();
        assert!(json.get("filter").is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Command::decode(b"{not json").unwrap_err();
        assert!(matches!(err, ReplikvError::Malformed { .. }));

        let err = Command::decode(br#"{"type":"explode","key":"k"}"#).unwrap_err();
        assert!(matches!(err, ReplikvError::Malformed { .. }));
    }

    #[test]
    fn test_result_accessors() {
        let result = CommandResult::Remove {
            key: "k".to_string(),
            value: Bytes::from_static(b"old"),
            index: 7,
        };
        assert_eq!(result.kind(), CommandKind::Remove);
        assert_eq!(result.index(), 7);
        assert_eq!(result.value().unwrap().as_ref(), b"old");
        assert!(result.keys().is_none());

        let decoded = CommandResult::decode(&result.encode().unwrap()).unwrap();
        assert_eq!(decoded, result);
    }
}
