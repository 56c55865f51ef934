//! Synchronization error types.

use snafu::Snafu;

use crate::auth::AuthError;
use crate::coordination::CoordinationError;
use crate::document::MaterializerError;
use crate::storage::ClientId;
use crate::storage::DocId;
use crate::storage::StorageError;

/// Errors surfaced by the PushPull path.
///
/// Everything on the synchronous path propagates to the caller; the
/// asynchronous snapshot tail only logs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SyncError {
    /// The authorization gate rejected the call, most commonly with
    /// [`AuthError::NotAllowed`].
    #[snafu(display("access denied: {source}"))]
    Auth {
        /// The underlying authorization error.
        source: AuthError,
    },

    /// Pushed changes violate client sequence contiguity.
    #[snafu(display("protocol violation: {message}"))]
    Protocol {
        /// What the client sent wrong.
        message: String,
    },

    /// The storage optimistic check failed; the caller may retry the
    /// whole PushPull.
    #[snafu(display("concurrent writer advanced the document: {source}"))]
    Conflict {
        /// The underlying conflict.
        source: StorageError,
    },

    /// The client is not attached to the document it wants to sync.
    #[snafu(display("client {client_id} is not attached to document {doc_id}"))]
    ClientNotAttached {
        /// The client.
        client_id: ClientId,
        /// The document.
        doc_id: DocId,
    },

    /// The request pack names a different document than the loaded one.
    #[snafu(display("document key mismatch: expected {expected}, got {actual}"))]
    DocumentMismatch {
        /// Key of the loaded document.
        expected: String,
        /// Key carried by the request pack.
        actual: String,
    },

    /// An unexpected storage fault.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// The underlying storage error.
        source: StorageError,
    },

    /// A coordinator fault.
    #[snafu(display("coordination error: {source}"))]
    Coordination {
        /// The underlying coordination error.
        source: CoordinationError,
    },

    /// The materializer could not build a snapshot.
    #[snafu(display("snapshot materialization failed: {source}"))]
    Materialize {
        /// The underlying materializer error.
        source: MaterializerError,
    },

    /// An unexpected engine fault.
    #[snafu(display("internal fault: {message}"))]
    Internal {
        /// Description of the fault.
        message: String,
    },
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { .. } => SyncError::Conflict { source: err },
            StorageError::DocumentNotAttached { client_id, doc_id } => {
                SyncError::ClientNotAttached { client_id, doc_id }
            }
            StorageError::Internal { message } => SyncError::Internal { message },
            other => SyncError::Storage { source: other },
        }
    }
}

impl From<AuthError> for SyncError {
    fn from(err: AuthError) -> Self {
        SyncError::Auth { source: err }
    }
}
