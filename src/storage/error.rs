//! Storage error types.

use snafu::Snafu;

use crate::storage::types::ClientId;
use crate::storage::types::DocId;

/// Errors from the storage layer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The optimistic concurrency check on a conditional append failed:
    /// the document advanced between read and write.
    #[snafu(display(
        "document {doc_id} advanced past expected server seq {expected_server_seq}"
    ))]
    Conflict {
        /// The document whose cursor drifted.
        doc_id: DocId,
        /// The server sequence the writer based its append on.
        expected_server_seq: u64,
    },

    /// A client record was not found.
    #[snafu(display("client {client_id} not found"))]
    ClientNotFound {
        /// The missing client.
        client_id: ClientId,
    },

    /// A document record was not found.
    #[snafu(display("document {doc_id} not found"))]
    DocumentNotFound {
        /// The missing document.
        doc_id: DocId,
    },

    /// The client is not attached to the document.
    #[snafu(display("client {client_id} is not attached to document {doc_id}"))]
    DocumentNotAttached {
        /// The client.
        client_id: ClientId,
        /// The document.
        doc_id: DocId,
    },

    /// The client is already attached to the document.
    #[snafu(display("client {client_id} is already attached to document {doc_id}"))]
    DocumentAlreadyAttached {
        /// The client.
        client_id: ClientId,
        /// The document.
        doc_id: DocId,
    },

    /// An unexpected storage fault.
    #[snafu(display("storage fault: {message}"))]
    Internal {
        /// Description of the fault.
        message: String,
    },
}
