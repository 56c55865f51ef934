//! The PushPull synchronization engine.
//!
//! [`synchronize`] is the checked entry point: it verifies the request
//! pack against the loaded document, enforces the attach precondition,
//! and holds the document's cluster-wide `pushpull` lock around the
//! engine. [`push_pull`] is the engine itself for callers that manage
//! the critical section at a different layer.

mod error;
mod pushpull;
mod snapshot;

pub use error::SyncError;
pub use pushpull::push_pull;
pub use snapshot::store_snapshot;

use tracing::error;

use crate::backend::Backend;
use crate::coordination::LockKey;
use crate::document::ChangePack;
use crate::document::DocumentKey;
use crate::storage::ClientInfo;
use crate::storage::DocInfo;

/// The cluster lock serializing PushPull calls on one document.
pub fn push_pull_key(document_key: &DocumentKey) -> LockKey {
    LockKey::new(format!("pushpull-{}", document_key.combined()))
}

/// The cluster lock electing a single snapshot writer per document.
pub fn snapshot_key(document_key: &DocumentKey) -> LockKey {
    LockKey::new(format!("snapshot-{}", document_key.combined()))
}

/// Run a PushPull under the document's cluster-wide lock.
///
/// Precondition failures surface before the lock is taken: the request
/// pack must name the loaded document and the client must be attached
/// to it.
pub async fn synchronize(
    backend: &std::sync::Arc<Backend>,
    client_info: &mut ClientInfo,
    doc_info: &mut DocInfo,
    req_pack: ChangePack,
) -> Result<ChangePack, SyncError> {
    if doc_info.key() != &req_pack.document_key {
        return error::DocumentMismatchSnafu {
            expected: doc_info.key().combined(),
            actual: req_pack.document_key.combined(),
        }
        .fail();
    }
    client_info.ensure_document_attached(doc_info.id())?;

    let mut locker = backend.coordinator().new_locker(push_pull_key(&req_pack.document_key));
    locker
        .lock()
        .await
        .map_err(|source| SyncError::Coordination { source })?;

    let result = push_pull(backend, client_info, doc_info, req_pack).await;

    if let Err(err) = locker.unlock().await {
        error!(error = %err, "failed to release pushpull lock");
    }
    result
}
