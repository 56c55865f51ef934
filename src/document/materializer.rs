//! The CRDT collaborator seam.
//!
//! The engine treats operations as opaque bytes; actually merging them
//! into a document state is delegated to a [`Materializer`]. The snapshot
//! worker and the pull-side snapshot assembler both drive this trait, so
//! a deployment plugs its CRDT implementation in exactly one place.

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;

use crate::document::Change;
use crate::document::TimeTicket;

/// Error materializing a snapshot.
#[derive(Debug, Snafu)]
pub enum MaterializerError {
    /// A previous snapshot could not be decoded.
    #[snafu(display("failed to decode previous snapshot: {source}"))]
    DecodeSnapshot {
        /// The underlying decode error.
        source: serde_json::Error,
    },

    /// The new state could not be encoded.
    #[snafu(display("failed to encode snapshot: {source}"))]
    EncodeSnapshot {
        /// The underlying encode error.
        source: serde_json::Error,
    },
}

/// Folds changes into a materialized document state.
///
/// Implementations must be deterministic: materializing the same previous
/// snapshot, change list and horizon twice yields byte-identical output.
/// The snapshot worker relies on this for idempotent re-runs.
pub trait Materializer: Send + Sync {
    /// Apply `changes` on top of `prev` (a previously materialized
    /// snapshot, absent for a fresh document) and drop whatever the
    /// concrete CRDT may collect strictly below `horizon`.
    fn materialize(
        &self,
        prev: Option<&Bytes>,
        changes: &[Change],
        horizon: Option<&TimeTicket>,
    ) -> Result<Bytes, MaterializerError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OpaqueState {
    entries: Vec<OpaqueEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpaqueEntry {
    created_at: TimeTicket,
    payload: Bytes,
}

/// Default materializer for deployments that keep operations opaque.
///
/// Accumulates operation payloads keyed by their creation ticket and
/// prunes entries strictly below the horizon, which is where a real CRDT
/// would collect tombstones. Not a merge algebra; a stand-in with the
/// right determinism and idempotency properties.
#[derive(Debug, Default)]
pub struct OpaqueMaterializer;

impl Materializer for OpaqueMaterializer {
    fn materialize(
        &self,
        prev: Option<&Bytes>,
        changes: &[Change],
        horizon: Option<&TimeTicket>,
    ) -> Result<Bytes, MaterializerError> {
        let mut state = match prev {
            Some(bytes) => serde_json::from_slice::<OpaqueState>(bytes).context(DecodeSnapshotSnafu)?,
            None => OpaqueState::default(),
        };

        for change in changes {
            for (index, payload) in change.operations().iter().enumerate() {
                state.entries.push(OpaqueEntry {
                    created_at: change.id().new_time_ticket(index as u32),
                    payload: payload.clone(),
                });
            }
        }

        if let Some(horizon) = horizon {
            state.entries.retain(|entry| entry.created_at >= *horizon);
        }

        let encoded = serde_json::to_vec(&state).context(EncodeSnapshotSnafu)?;
        Ok(Bytes::from(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ActorId;
    use crate::document::ChangeId;

    fn change(client_seq: u32, lamport: u64, ops: usize) -> Change {
        let id = ChangeId::new(client_seq, lamport, ActorId::from_bytes([7; 12]));
        Change::new(
            id,
            None,
            (0..ops).map(|i| Bytes::from(vec![i as u8])).collect(),
        )
    }

    #[test]
    fn accumulates_operations() {
        let m = OpaqueMaterializer;
        let snapshot = m.materialize(None, &[change(1, 1, 2), change(2, 2, 1)], None).unwrap();
        let state: OpaqueState = serde_json::from_slice(&snapshot).unwrap();
        assert_eq!(state.entries.len(), 3);
    }

    #[test]
    fn is_deterministic_and_idempotent() {
        let m = OpaqueMaterializer;
        let changes = [change(1, 1, 2), change(2, 5, 1)];
        let horizon = TimeTicket::new(2, 0, ActorId::INITIAL);
        let a = m.materialize(None, &changes, Some(&horizon)).unwrap();
        let b = m.materialize(None, &changes, Some(&horizon)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn prunes_strictly_below_horizon() {
        let m = OpaqueMaterializer;
        let changes = [change(1, 1, 1), change(2, 5, 1)];
        let horizon = TimeTicket::new(5, 0, ActorId::INITIAL);
        let snapshot = m.materialize(None, &changes, Some(&horizon)).unwrap();
        let state: OpaqueState = serde_json::from_slice(&snapshot).unwrap();
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].created_at.lamport(), 5);
    }

    #[test]
    fn resumes_from_previous_snapshot() {
        let m = OpaqueMaterializer;
        let first = m.materialize(None, &[change(1, 1, 1)], None).unwrap();
        let second = m.materialize(Some(&first), &[change(2, 2, 1)], None).unwrap();
        let state: OpaqueState = serde_json::from_slice(&second).unwrap();
        assert_eq!(state.entries.len(), 2);
    }
}
