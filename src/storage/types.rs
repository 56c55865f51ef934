//! Persisted record types.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::document::ActorId;
use crate::document::Change;
use crate::document::ChangeId;
use crate::document::Checkpoint;
use crate::document::DocumentKey;
use crate::document::TimeTicket;
use crate::storage::StorageError;
use crate::storage::error;

/// Milliseconds since the Unix epoch.
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

macro_rules! record_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name([u8; 12]);

        impl $name {
            /// Generate a fresh random id.
            pub fn random() -> Self {
                $name(rand::random())
            }

            /// Create an id from raw bytes.
            pub const fn from_bytes(bytes: [u8; 12]) -> Self {
                $name(bytes)
            }

            /// The raw bytes of this id.
            pub fn as_bytes(&self) -> &[u8; 12] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }
    };
}

record_id! {
    /// Storage identity of a client.
    ClientId
}

record_id! {
    /// Storage identity of a document.
    DocId
}

impl From<ClientId> for ActorId {
    /// A client's storage id doubles as its actor identity on the wire.
    fn from(id: ClientId) -> ActorId {
        ActorId::from_bytes(*id.as_bytes())
    }
}

/// Attachment state of a client for one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientDocStatus {
    /// The client is not currently editing the document.
    Detached,
    /// The client participates in synchronization.
    Attached,
    /// The document was removed while the client was attached.
    Removed,
}

/// Per-document synchronization state of a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientDocInfo {
    /// Attachment state.
    pub status: ClientDocStatus,
    /// Last stored checkpoint.
    pub checkpoint: Checkpoint,
}

/// A client and its per-document synchronization state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientInfo {
    id: ClientId,
    documents: HashMap<DocId, ClientDocInfo>,
    updated_at: u64,
}

impl ClientInfo {
    /// Create a client with no document attachments.
    pub fn new(id: ClientId) -> Self {
        ClientInfo {
            id,
            documents: HashMap::new(),
            updated_at: now_unix_ms(),
        }
    }

    /// The client's storage id.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Attach the client to a document, resetting its checkpoint when it
    /// was not previously attached.
    pub fn attach_document(&mut self, doc_id: DocId) -> Result<(), StorageError> {
        if self.is_attached(doc_id) {
            return error::DocumentAlreadyAttachedSnafu {
                client_id: self.id,
                doc_id,
            }
            .fail();
        }
        self.documents.insert(
            doc_id,
            ClientDocInfo {
                status: ClientDocStatus::Attached,
                checkpoint: Checkpoint::INITIAL,
            },
        );
        self.updated_at = now_unix_ms();
        Ok(())
    }

    /// Detach the client from a document it is attached to.
    pub fn detach_document(&mut self, doc_id: DocId) -> Result<(), StorageError> {
        self.ensure_document_attached(doc_id)?;
        if let Some(doc) = self.documents.get_mut(&doc_id) {
            doc.status = ClientDocStatus::Detached;
        }
        self.updated_at = now_unix_ms();
        Ok(())
    }

    /// Whether the client is attached to the document.
    pub fn is_attached(&self, doc_id: DocId) -> bool {
        self.documents
            .get(&doc_id)
            .is_some_and(|doc| doc.status == ClientDocStatus::Attached)
    }

    /// Fail unless the client is attached to the document.
    pub fn ensure_document_attached(&self, doc_id: DocId) -> Result<(), StorageError> {
        if !self.is_attached(doc_id) {
            return error::DocumentNotAttachedSnafu {
                client_id: self.id,
                doc_id,
            }
            .fail();
        }
        Ok(())
    }

    /// The stored checkpoint for a document, initial when unknown.
    pub fn checkpoint_of(&self, doc_id: DocId) -> Checkpoint {
        self.documents
            .get(&doc_id)
            .map(|doc| doc.checkpoint)
            .unwrap_or(Checkpoint::INITIAL)
    }

    /// Forward the stored checkpoint for an attached document.
    ///
    /// Forwarding rather than overwriting keeps both fields monotonic
    /// when a client retries an older request.
    pub fn update_checkpoint(
        &mut self,
        doc_id: DocId,
        checkpoint: Checkpoint,
    ) -> Result<(), StorageError> {
        self.ensure_document_attached(doc_id)?;
        if let Some(doc) = self.documents.get_mut(&doc_id) {
            doc.checkpoint = doc.checkpoint.forward(&checkpoint);
        }
        self.updated_at = now_unix_ms();
        Ok(())
    }

    /// Ids of all documents this record carries state for.
    pub fn document_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.documents.keys().copied()
    }

    /// Last update timestamp, Unix milliseconds.
    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }
}

/// A document and its persistence cursor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocInfo {
    id: DocId,
    key: DocumentKey,
    server_seq: u64,
    created_at: u64,
    updated_at: u64,
}

impl DocInfo {
    /// Create a fresh document record.
    pub fn new(id: DocId, key: DocumentKey) -> Self {
        let now = now_unix_ms();
        DocInfo {
            id,
            key,
            server_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The document's storage id.
    pub fn id(&self) -> DocId {
        self.id
    }

    /// The document's key.
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Highest assigned server sequence.
    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    /// Creation timestamp, Unix milliseconds.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Last update timestamp, Unix milliseconds.
    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Assign the next server sequence.
    pub fn increase_server_seq(&mut self) -> u64 {
        self.server_seq += 1;
        self.updated_at = now_unix_ms();
        self.server_seq
    }
}

/// Persisted form of a [`Change`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeInfo {
    /// Owning document.
    pub doc_id: DocId,
    /// Server-assigned sequence, dense per document.
    pub server_seq: u64,
    /// Client-local sequence.
    pub client_seq: u32,
    /// Lamport timestamp.
    pub lamport: u64,
    /// Producing actor.
    pub actor: ActorId,
    /// Optional commit-style message.
    pub message: Option<String>,
    /// Opaque operation payloads.
    pub operations: Vec<Bytes>,
}

impl ChangeInfo {
    /// Persisted form of a server-stamped change.
    pub fn from_change(doc_id: DocId, change: &Change) -> Option<Self> {
        Some(ChangeInfo {
            doc_id,
            server_seq: change.id().server_seq()?,
            client_seq: change.id().client_seq(),
            lamport: change.id().lamport(),
            actor: change.id().actor(),
            message: change.message().map(str::to_owned),
            operations: change.operations().to_vec(),
        })
    }

    /// Reconstruct the wire-form change.
    pub fn to_change(&self) -> Change {
        let id = ChangeId::new(self.client_seq, self.lamport, self.actor)
            .with_server_seq(self.server_seq);
        Change::new(id, self.message.clone(), self.operations.clone())
    }
}

/// A materialized document state at a server sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Owning document.
    pub doc_id: DocId,
    /// Server sequence the snapshot covers through.
    pub server_seq: u64,
    /// Materialized state.
    pub snapshot: Bytes,
    /// Creation timestamp, Unix milliseconds.
    pub created_at: u64,
}

/// Per-(document, client) record of the ticket synced through.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncedSeqInfo {
    /// Owning document.
    pub doc_id: DocId,
    /// Owning client.
    pub client_id: ClientId,
    /// The lamport ticket the client has synced through.
    pub ticket: TimeTicket,
}
