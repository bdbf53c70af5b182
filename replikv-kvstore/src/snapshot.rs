//! # Snapshot Handle and Envelope
//!
//! A [`KvSnapshot`] holds an immutable copy of the state taken under the
//! read lock. Serialization into the self-describing envelope happens in
//! [`StateSnapshot::persist`], after the lock has been released.

use crate::state::KvState;
use async_trait::async_trait;
use bytes::Bytes;
use replikv_core::persistence::{SnapshotMeta, SnapshotSink};
use replikv_core::state_machine::StateSnapshot;
use replikv_core::{ReplikvError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Current envelope format.
pub const SNAPSHOT_FORMAT: u32 = 1;

/// On-disk/on-wire representation of a snapshot.
///
/// `checksum` is the CRC32 of the JSON encoding of `state`. The state
/// serializes as a sorted object, so the encoding is identical on every
/// node and the checksum can be recomputed after decoding.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format: u32,
    checksum: u32,
    state: KvState,
}

/// Encodes `state` into an envelope.
///
/// The state is serialized once; the checksum and the envelope share that
/// encoding, so the output matches serializing a [`SnapshotEnvelope`].
pub fn encode_snapshot(state: &KvState) -> Result<Bytes> {
    let encoded = encode_state(state)?;
    let checksum = crc32fast::hash(&encoded);

    let header = format!(
        "{{\"format\":{},\"checksum\":{},\"state\":",
        SNAPSHOT_FORMAT, checksum
    );
    let mut data = Vec::with_capacity(header.len() + encoded.len() + 1);
    data.extend_from_slice(header.as_bytes());
    data.extend_from_slice(&encoded);
    data.push(b'}');
    Ok(Bytes::from(data))
}

/// Decodes and verifies an envelope produced by [`encode_snapshot`] on any
/// node.
pub fn decode_snapshot(data: &[u8]) -> Result<KvState> {
    let envelope: SnapshotEnvelope = serde_json::from_slice(data)
        .map_err(|e| ReplikvError::restore_io(format!("Failed to decode snapshot: {}", e)))?;

    if envelope.format != SNAPSHOT_FORMAT {
        return Err(ReplikvError::restore_io(format!(
            "Unsupported snapshot format {}",
            envelope.format
        )));
    }

    let actual = state_checksum(&envelope.state)?;
    if actual != envelope.checksum {
        return Err(ReplikvError::ChecksumMismatch {
            expected: envelope.checksum,
            actual,
        });
    }

    Ok(envelope.state)
}

fn encode_state(state: &KvState) -> Result<Vec<u8>> {
    serde_json::to_vec(state)
        .map_err(|e| ReplikvError::snapshot_io(format!("Failed to encode state: {}", e)))
}

fn state_checksum(state: &KvState) -> Result<u32> {
    Ok(crc32fast::hash(&encode_state(state)?))
}

/// Point-in-time copy of the key-value state.
#[derive(Debug, Clone)]
pub struct KvSnapshot {
    state: KvState,
}

impl KvSnapshot {
    pub(crate) fn new(state: KvState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &KvState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Serializes the snapshot without going through a sink.
    pub fn to_bytes(&self) -> Result<Bytes> {
        encode_snapshot(&self.state)
    }
}

#[async_trait]
impl StateSnapshot for KvSnapshot {
    async fn persist(&self, mut sink: Box<dyn SnapshotSink>) -> Result<SnapshotMeta> {
        let data = match self.to_bytes() {
            Ok(data) => data,
            Err(e) => {
                if let Err(cancel_err) = sink.cancel().await {
                    warn!("Failed to cancel snapshot sink: {}", cancel_err);
                }
                return Err(e);
            }
        };

        if let Err(e) = sink.write(&data).await {
            let id = sink.id().to_string();
            if let Err(cancel_err) = sink.cancel().await {
                warn!("Failed to cancel snapshot sink {}: {}", id, cancel_err);
            }
            return Err(ReplikvError::snapshot_io(format!(
                "Failed to write snapshot {}: {}",
                id, e
            )));
        }

        let meta = sink.close().await?;
        debug!(
            "Snapshot persisted: id={}, keys={}, bytes={}",
            meta.id,
            self.state.len(),
            meta.size
        );
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KvState {
        let mut state = KvState::new();
        state.insert("alpha", Bytes::from_static(b"1"));
        state.insert("beta", Bytes::from_static(b"\x00\xff"));
        state
    }

    #[test]
    fn test_envelope_round_trip() {
        let state = sample();
        let data = encode_snapshot(&state).unwrap();
        assert_eq!(decode_snapshot(&data).unwrap(), state);
    }

    #[test]
    fn test_envelope_matches_serialized_layout() {
        let state = sample();
        let envelope = SnapshotEnvelope {
            format: SNAPSHOT_FORMAT,
            checksum: state_checksum(&state).unwrap(),
            state: state.clone(),
        };

        let expected = serde_json::to_vec(&envelope).unwrap();
        assert_eq!(encode_snapshot(&state).unwrap().as_ref(), expected.as_slice());
        assert_eq!(
            encode_snapshot(&KvState::new()).unwrap().as_ref(),
            serde_json::to_vec(&SnapshotEnvelope {
                format: SNAPSHOT_FORMAT,
                checksum: state_checksum(&KvState::new()).unwrap(),
                state: KvState::new(),
            })
            .unwrap()
            .as_slice()
        );
    }

    #[test]
    fn test_envelope_is_byte_identical_for_equal_states() {
        let mut other = KvState::new();
        other.insert("beta", Bytes::from_static(b"\x00\xff"));
        other.insert("alpha", Bytes::from_static(b"1"));

        assert_eq!(
            encode_snapshot(&sample()).unwrap(),
            encode_snapshot(&other).unwrap()
        );
    }

    #[test]
    fn test_decode_detects_tampering() {
        let data = encode_snapshot(&sample()).unwrap();
        let mut envelope: serde_json::Value = serde_json::from_slice(&data).unwrap();
        envelope["state"]["alpha"] = serde_json::json!([50]);
        let tampered = serde_json::to_vec(&envelope).unwrap();

        assert!(matches!(
            decode_snapshot(&tampered),
            Err(ReplikvError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_format() {
        let data = encode_snapshot(&sample()).unwrap();
        let mut envelope: serde_json::Value = serde_json::from_slice(&data).unwrap();
        envelope["format"] = serde_json::json!(99);
        let data = serde_json::to_vec(&envelope).unwrap();

        assert!(matches!(
            decode_snapshot(&data),
            Err(ReplikvError::RestoreIo { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_snapshot(b"definitely not a snapshot"),
            Err(ReplikvError::RestoreIo { .. })
        ));
    }
}
