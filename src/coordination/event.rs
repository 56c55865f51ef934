//! Document events fanned out through the coordinator.

use serde::Deserialize;
use serde::Serialize;

use crate::document::ActorId;
use crate::document::DocumentKey;

/// What happened to the documents named in a [`DocEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocEventKind {
    /// New changes were persisted for the documents.
    DocumentsChanged,
}

/// An event about one or more documents, delivered to watchers on any
/// node. Published after the corresponding changes are persisted, so a
/// receiver that syncs on delivery observes them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEvent {
    /// The kind of event.
    pub kind: DocEventKind,
    /// The actor whose sync produced the event.
    pub publisher: ActorId,
    /// The documents concerned.
    pub document_keys: Vec<DocumentKey>,
}

impl DocEvent {
    /// A documents-changed event from `publisher`.
    pub fn documents_changed(publisher: ActorId, document_keys: Vec<DocumentKey>) -> Self {
        DocEvent {
            kind: DocEventKind::DocumentsChanged,
            publisher,
            document_keys,
        }
    }
}
