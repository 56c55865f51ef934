//! The change pack, the unit transferred on every sync.

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::document::Change;
use crate::document::Checkpoint;
use crate::document::DocumentKey;
use crate::document::TimeTicket;

/// One end of a synchronization exchange.
///
/// A request pack carries the client's checkpoint and locally produced
/// changes. A response pack carries either an incremental `changes` list
/// or a `snapshot`, never both, plus the new checkpoint and the global
/// minimum-synced ticket the client may garbage-collect behind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangePack {
    /// The document being synchronized.
    pub document_key: DocumentKey,
    /// Checkpoint after applying this pack.
    pub checkpoint: Checkpoint,
    /// Ordered changes; empty on a pure pull.
    pub changes: Vec<Change>,
    /// Materialized document state, replacing `changes` on long pulls.
    pub snapshot: Option<Bytes>,
    /// Horizon beyond which operations may be tombstone-collected.
    pub min_synced_ticket: Option<TimeTicket>,
}

impl ChangePack {
    /// Create a pack.
    pub fn new(
        document_key: DocumentKey,
        checkpoint: Checkpoint,
        changes: Vec<Change>,
        snapshot: Option<Bytes>,
    ) -> Self {
        ChangePack {
            document_key,
            checkpoint,
            changes,
            snapshot,
            min_synced_ticket: None,
        }
    }

    /// Whether the pack carries any changes.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Number of changes carried.
    pub fn changes_len(&self) -> usize {
        self.changes.len()
    }

    /// Total number of operations across all carried changes.
    pub fn operations_len(&self) -> usize {
        self.changes.iter().map(Change::operations_len).sum()
    }

    /// Size of the carried snapshot in bytes, zero when absent.
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, Bytes::len)
    }
}
