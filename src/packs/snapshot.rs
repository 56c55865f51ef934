//! Opportunistic snapshot storage.

use std::sync::Arc;

use snafu::ResultExt;
use tracing::debug;
use tracing::info;

use crate::backend::Backend;
use crate::document::TimeTicket;
use crate::packs::SyncError;
use crate::packs::error;
use crate::storage::DocInfo;

/// Materialize and store a snapshot of the document bounded by
/// `horizon`, the minimum synced ticket: operations strictly below it
/// may be collected because every attached client has seen them.
///
/// Skips documents that have not accumulated `snapshot_interval` changes
/// since the last stored snapshot. Repeated runs at the same horizon are
/// idempotent, so racing workers on different nodes are harmless; the
/// coordinator lock merely keeps the work singleton.
pub async fn store_snapshot(
    backend: &Arc<Backend>,
    doc_info: &DocInfo,
    horizon: &TimeTicket,
) -> Result<(), SyncError> {
    let snapshot_info = backend
        .storage()
        .find_closest_snapshot_info(doc_info.id(), doc_info.server_seq())
        .await?;
    let covered = snapshot_info.as_ref().map_or(0, |info| info.server_seq);
    if doc_info.server_seq() - covered < backend.config().snapshot_interval {
        debug!(
            key = %doc_info.key(),
            server_seq = doc_info.server_seq(),
            covered,
            "snapshot interval not reached, skipping"
        );
        return Ok(());
    }

    let changes = backend
        .storage()
        .find_changes_between(doc_info.id(), covered + 1, doc_info.server_seq())
        .await?;
    let snapshot = backend
        .materializer()
        .materialize(
            snapshot_info.as_ref().map(|info| &info.snapshot),
            &changes,
            Some(horizon),
        )
        .context(error::MaterializeSnafu)?;

    backend
        .storage()
        .create_snapshot_info(doc_info.id(), doc_info.server_seq(), snapshot)
        .await?;
    info!(
        key = %doc_info.key(),
        server_seq = doc_info.server_seq(),
        applied = changes.len(),
        horizon = %horizon,
        "stored snapshot"
    );
    Ok(())
}
