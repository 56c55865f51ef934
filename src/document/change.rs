//! Change identifiers and the change unit.
//!
//! A [`ChangeId`] carries the Lamport timestamp that gives changes a
//! cheap causal-consistency substrate. Combined with the actor tie-break
//! in [`TimeTicket`](crate::document::TimeTicket) ordering, this is
//! enough for CRDT tombstone collection without vector clocks.

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::document::ActorId;
use crate::document::TimeTicket;

/// Identifies a [`Change`]. Immutable; every mutator returns a new id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeId {
    client_seq: u32,
    lamport: u64,
    actor: ActorId,
    /// Assigned by the server on persistence; absent until then.
    server_seq: Option<u64>,
}

impl ChangeId {
    /// The id of a state where nothing has been edited yet.
    pub const INITIAL: ChangeId = ChangeId {
        client_seq: 0,
        lamport: 0,
        actor: ActorId::INITIAL,
        server_seq: None,
    };

    /// Create an unpersisted id.
    pub const fn new(client_seq: u32, lamport: u64, actor: ActorId) -> Self {
        ChangeId {
            client_seq,
            lamport,
            actor,
            server_seq: None,
        }
    }

    /// The id of the next local change: client sequence and lamport both
    /// advance by one.
    pub fn next(&self) -> ChangeId {
        ChangeId::new(self.client_seq + 1, self.lamport + 1, self.actor)
    }

    /// Sync the lamport component with a received timestamp.
    ///
    /// Follows Lamport's receive rule: adopt the remote value when it is
    /// ahead, otherwise advance the local one past it.
    pub fn sync_lamport(&self, other_lamport: u64) -> ChangeId {
        if self.lamport < other_lamport {
            ChangeId::new(self.client_seq, other_lamport, self.actor)
        } else {
            ChangeId::new(self.client_seq, self.lamport + 1, self.actor)
        }
    }

    /// A ticket at this id's lamport with the given delimiter.
    pub fn new_time_ticket(&self, delimiter: u32) -> TimeTicket {
        TimeTicket::new(self.lamport, delimiter, self.actor)
    }

    /// Stamp the server sequence assigned on persistence.
    pub fn with_server_seq(&self, server_seq: u64) -> ChangeId {
        ChangeId {
            server_seq: Some(server_seq),
            ..*self
        }
    }

    /// Rebind the id to another actor.
    pub fn with_actor(&self, actor: ActorId) -> ChangeId {
        ChangeId { actor, ..*self }
    }

    /// The client-local sequence number.
    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    /// The lamport timestamp.
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// The actor that produced the change.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// The server sequence, if the change has been persisted.
    pub fn server_seq(&self) -> Option<u64> {
        self.server_seq
    }
}

/// An atomic set of opaque operations produced by one actor.
///
/// The engine never interprets `operations`; it orders, persists and
/// forwards them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    id: ChangeId,
    message: Option<String>,
    operations: Vec<Bytes>,
}

impl Change {
    /// Create a change.
    pub fn new(id: ChangeId, message: Option<String>, operations: Vec<Bytes>) -> Self {
        Change {
            id,
            message,
            operations,
        }
    }

    /// The change identifier.
    pub fn id(&self) -> &ChangeId {
        &self.id
    }

    /// The optional commit-style message attached by the client.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The opaque operation payloads.
    pub fn operations(&self) -> &[Bytes] {
        &self.operations
    }

    /// Number of operations carried.
    pub fn operations_len(&self) -> usize {
        self.operations.len()
    }

    /// Stamp the server sequence assigned on persistence.
    pub fn set_server_seq(&mut self, server_seq: u64) {
        self.id = self.id.with_server_seq(server_seq);
    }
}
