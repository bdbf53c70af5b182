//! # Key-Value State
//!
//! The mapping being replicated. Pure data: all synchronization lives in
//! [`KvStateMachine`](crate::KvStateMachine).

use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String keys to opaque byte values.
///
/// Backed by a `BTreeMap`, so iteration and therefore `List` results are in
/// lexicographic (byte-wise) key order on every replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KvState {
    entries: BTreeMap<String, Bytes>,
}

impl KvState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(key)
    }

    /// Upserts `value`, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: Bytes) -> Option<Bytes> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Bytes> {
        self.entries.remove(key)
    }

    /// Keys matching `filter` (all keys when `None`), in lexicographic order.
    pub fn keys(&self, filter: Option<&Regex>) -> Vec<String> {
        self.entries
            .keys()
            .filter(|key| filter.map_or(true, |re| re.is_match(key)))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bytes)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate payload size: key and value bytes.
    pub fn size_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl FromIterator<(String, Bytes)> for KvState {
    fn from_iter<I: IntoIterator<Item = (String, Bytes)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KvState {
        ["foo", "bar", "baz"]
            .into_iter()
            .map(|k| (k.to_string(), Bytes::from(format!("{k}-value"))))
            .collect()
    }

    #[test]
    fn test_keys_are_sorted() {
        let state = sample();
        assert_eq!(state.keys(None), vec!["bar", "baz", "foo"]);
    }

    #[test]
    fn test_keys_with_filter() {
        let state = sample();
        let re = Regex::new("^ba").unwrap();
        assert_eq!(state.keys(Some(&re)), vec!["bar", "baz"]);

        let re = Regex::new("o").unwrap();
        assert_eq!(state.keys(Some(&re)), vec!["foo"]);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut state = KvState::new();
        assert!(state.insert("k", Bytes::from_static(b"v1")).is_none());
        assert_eq!(
            state.insert("k", Bytes::from_static(b"v2")),
            Some(Bytes::from_static(b"v1"))
        );
        assert_eq!(state.len(), 1);
        assert_eq!(state.size_bytes(), 3);
        assert_eq!(state.remove("k"), Some(Bytes::from_static(b"v2")));
        assert!(state.remove("k").is_none());
        assert!(state.is_empty());
    }
}
