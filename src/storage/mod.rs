//! Storage consumed by the synchronization engine.
//!
//! The engine mutates [`DocInfo`] and [`ClientInfo`] only through this
//! trait's conditional writes; in-memory copies are request-local. The
//! conditional append [`Storage::create_change_infos`] is the optimistic
//! concurrency point that keeps server sequences dense per document
//! under concurrent writers.
//!
//! [`MemoryStorage`] is the single-node implementation used in tests and
//! embedded deployments; production deployments implement the trait over
//! their database of choice.

mod error;
mod memory;
mod types;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::StorageError;
pub use memory::MemoryStorage;
pub use types::ChangeInfo;
pub use types::ClientDocInfo;
pub use types::ClientDocStatus;
pub use types::ClientId;
pub use types::ClientInfo;
pub use types::DocId;
pub use types::DocInfo;
pub use types::SnapshotInfo;
pub use types::SyncedSeqInfo;
pub use types::now_unix_ms;

use crate::document::Change;
use crate::document::DocumentKey;
use crate::document::TimeTicket;

/// Abstract persistence operations the engine needs.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look up a client record.
    async fn find_client_info(&self, client_id: ClientId) -> Result<ClientInfo, StorageError>;

    /// Upsert a client record (attach/detach lifecycle).
    async fn update_client_info(&self, client_info: &ClientInfo) -> Result<(), StorageError>;

    /// Find the document for a key, creating an empty record on first use.
    async fn find_or_create_doc_info(&self, key: &DocumentKey) -> Result<DocInfo, StorageError>;

    /// Look up a document record.
    async fn find_doc_info(&self, doc_id: DocId) -> Result<DocInfo, StorageError>;

    /// Conditionally append server-stamped changes together with the
    /// document's new persistence cursor.
    ///
    /// Fails with [`StorageError::Conflict`] when the stored document has
    /// advanced past `initial_server_seq`, which serializes concurrent
    /// writers on the same document.
    async fn create_change_infos(
        &self,
        doc_info: &DocInfo,
        initial_server_seq: u64,
        changes: &[Change],
    ) -> Result<(), StorageError>;

    /// Persist the client's post-sync state.
    async fn update_client_info_after_push_pull(
        &self,
        client_info: &ClientInfo,
        doc_info: &DocInfo,
    ) -> Result<(), StorageError>;

    /// Changes with server sequence in `[from, to]`, in sequence order.
    async fn find_changes_between(
        &self,
        doc_id: DocId,
        from: u64,
        to: u64,
    ) -> Result<Vec<Change>, StorageError>;

    /// Record the ticket the client has synced through (at `server_seq`)
    /// and return the minimum synced ticket among the document's attached
    /// clients, [`TimeTicket::INITIAL`] when none remain.
    async fn update_and_find_min_synced_ticket(
        &self,
        client_info: &ClientInfo,
        doc_id: DocId,
        server_seq: u64,
    ) -> Result<TimeTicket, StorageError>;

    /// The latest snapshot covering at most `server_seq`, if any.
    async fn find_closest_snapshot_info(
        &self,
        doc_id: DocId,
        server_seq: u64,
    ) -> Result<Option<SnapshotInfo>, StorageError>;

    /// Persist a materialized snapshot at `server_seq`.
    async fn create_snapshot_info(
        &self,
        doc_id: DocId,
        server_seq: u64,
        snapshot: Bytes,
    ) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for std::sync::Arc<T> {
    async fn find_client_info(&self, client_id: ClientId) -> Result<ClientInfo, StorageError> {
        (**self).find_client_info(client_id).await
    }

    async fn update_client_info(&self, client_info: &ClientInfo) -> Result<(), StorageError> {
        (**self).update_client_info(client_info).await
    }

    async fn find_or_create_doc_info(&self, key: &DocumentKey) -> Result<DocInfo, StorageError> {
        (**self).find_or_create_doc_info(key).await
    }

    async fn find_doc_info(&self, doc_id: DocId) -> Result<DocInfo, StorageError> {
        (**self).find_doc_info(doc_id).await
    }

    async fn create_change_infos(
        &self,
        doc_info: &DocInfo,
        initial_server_seq: u64,
        changes: &[Change],
    ) -> Result<(), StorageError> {
        (**self)
            .create_change_infos(doc_info, initial_server_seq, changes)
            .await
    }

    async fn update_client_info_after_push_pull(
        &self,
        client_info: &ClientInfo,
        doc_info: &DocInfo,
    ) -> Result<(), StorageError> {
        (**self)
            .update_client_info_after_push_pull(client_info, doc_info)
            .await
    }

    async fn find_changes_between(
        &self,
        doc_id: DocId,
        from: u64,
        to: u64,
    ) -> Result<Vec<Change>, StorageError> {
        (**self).find_changes_between(doc_id, from, to).await
    }

    async fn update_and_find_min_synced_ticket(
        &self,
        client_info: &ClientInfo,
        doc_id: DocId,
        server_seq: u64,
    ) -> Result<TimeTicket, StorageError> {
        (**self)
            .update_and_find_min_synced_ticket(client_info, doc_id, server_seq)
            .await
    }

    async fn find_closest_snapshot_info(
        &self,
        doc_id: DocId,
        server_seq: u64,
    ) -> Result<Option<SnapshotInfo>, StorageError> {
        (**self).find_closest_snapshot_info(doc_id, server_seq).await
    }

    async fn create_snapshot_info(
        &self,
        doc_id: DocId,
        server_seq: u64,
        snapshot: Bytes,
    ) -> Result<(), StorageError> {
        (**self).create_snapshot_info(doc_id, server_seq, snapshot).await
    }
}
