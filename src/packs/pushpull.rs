//! The PushPull engine.
//!
//! One call pushes the client's new changes, pulls what the client is
//! missing (as changes or a snapshot), advances the client's checkpoint,
//! persists everything in a fixed order, and schedules the asynchronous
//! event-publication and snapshot tail.

use std::sync::Arc;
use std::time::Instant;

use snafu::ResultExt;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::backend::Backend;
use crate::coordination::DocEvent;
use crate::document::ActorId;
use crate::document::Change;
use crate::document::ChangePack;
use crate::document::Checkpoint;
use crate::document::TimeTicket;
use crate::packs::SyncError;
use crate::packs::error as pack_error;
use crate::packs::snapshot::store_snapshot;
use crate::packs::snapshot_key;
use crate::storage::ClientInfo;
use crate::storage::DocInfo;

/// Store the changes of a request pack and return what the client is
/// missing.
///
/// The caller has loaded `client_info` and `doc_info` and verified the
/// attach precondition; [`synchronize`](crate::packs::synchronize) is
/// the checked entry point. All pull decisions are made against the
/// document's server sequence captured on entry, so the response is
/// consistent even while other writers advance the document.
pub async fn push_pull(
    backend: &Arc<Backend>,
    client_info: &mut ClientInfo,
    doc_info: &mut DocInfo,
    req_pack: ChangePack,
) -> Result<ChangePack, SyncError> {
    let start = Instant::now();
    let initial_server_seq = doc_info.server_seq();

    // 01. Push changes into the document's sequence space.
    let (pushed_cp, pushed_changes) = push_changes(client_info, doc_info, &req_pack)?;

    // 02. Decide what to send back: a change range or a snapshot.
    let mut resp_pack = pull_pack(
        backend,
        doc_info,
        &req_pack,
        pushed_cp,
        initial_server_seq,
    )
    .await?;

    client_info.update_checkpoint(doc_info.id(), resp_pack.checkpoint)?;

    // 03. Persist pushed changes with the document cursor, then the
    // client state. The conditional append is the serialization point
    // for concurrent writers on this document.
    if !pushed_changes.is_empty() {
        backend
            .storage()
            .create_change_infos(doc_info, initial_server_seq, &pushed_changes)
            .await?;
    }
    backend
        .storage()
        .update_client_info_after_push_pull(client_info, doc_info)
        .await?;

    // 04. Credit the client with what it acknowledged in the request,
    // not what this response carries: if the response is lost, the
    // client must not be credited past what it acknowledged.
    let min_synced_ticket = backend
        .storage()
        .update_and_find_min_synced_ticket(client_info, doc_info.id(), req_pack.checkpoint.server_seq())
        .await?;
    resp_pack.min_synced_ticket = Some(min_synced_ticket);

    // 05. Publish the change event and store a snapshot off the request
    // path.
    if req_pack.has_changes() {
        let tail_backend = Arc::clone(backend);
        let publisher = ActorId::from(client_info.id());
        let tail_doc_info = doc_info.clone();
        backend.background().spawn(async move {
            publish_and_snapshot(tail_backend, publisher, tail_doc_info, min_synced_ticket).await;
        });
    }

    debug!(
        key = %resp_pack.document_key,
        client = %client_info.id(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "push pull finished"
    );
    Ok(resp_pack)
}

/// Assign server sequences to the genuinely new changes of the request.
///
/// Changes at or below the acknowledged client sequence are retries and
/// are skipped. Beyond that the client sequence must be contiguous;
/// reordered or gapped pushes are a protocol error.
fn push_changes(
    client_info: &ClientInfo,
    doc_info: &mut DocInfo,
    req_pack: &ChangePack,
) -> Result<(Checkpoint, Vec<Change>), SyncError> {
    let checkpoint = client_info.checkpoint_of(doc_info.id());

    let mut pushed = Vec::new();
    let mut last_client_seq = checkpoint.client_seq();
    for change in &req_pack.changes {
        let client_seq = change.id().client_seq();
        if client_seq <= checkpoint.client_seq() {
            debug!(
                client = %client_info.id(),
                client_seq,
                acknowledged = checkpoint.client_seq(),
                "change already pushed, skipping"
            );
            continue;
        }
        if client_seq != last_client_seq + 1 {
            return pack_error::ProtocolSnafu {
                message: format!(
                    "client seq {client_seq} is not contiguous with accepted {last_client_seq}"
                ),
            }
            .fail();
        }
        last_client_seq = client_seq;

        let server_seq = doc_info.increase_server_seq();
        let mut change = change.clone();
        change.set_server_seq(server_seq);
        pushed.push(change);
    }

    let pushed_cp = checkpoint
        .sync_client_seq(last_client_seq)
        .with_server_seq(doc_info.server_seq());

    if req_pack.has_changes() {
        info!(
            key = %req_pack.document_key,
            client = %client_info.id(),
            received = req_pack.changes_len(),
            accepted = pushed.len(),
            checkpoint = %pushed_cp,
            "pushed changes"
        );
    }
    Ok((pushed_cp, pushed))
}

/// Build the response pack against the captured server sequence.
async fn pull_pack(
    backend: &Arc<Backend>,
    doc_info: &DocInfo,
    req_pack: &ChangePack,
    pushed_cp: Checkpoint,
    initial_server_seq: u64,
) -> Result<ChangePack, SyncError> {
    // A checkpoint ahead of the captured sequence has nothing to pull.
    let missing = initial_server_seq.saturating_sub(req_pack.checkpoint.server_seq());
    if missing < backend.config().snapshot_threshold {
        pull_changes(backend, doc_info, req_pack, pushed_cp, initial_server_seq).await
    } else {
        pull_snapshot(backend, doc_info, req_pack, pushed_cp, initial_server_seq).await
    }
}

async fn pull_changes(
    backend: &Arc<Backend>,
    doc_info: &DocInfo,
    req_pack: &ChangePack,
    pushed_cp: Checkpoint,
    initial_server_seq: u64,
) -> Result<ChangePack, SyncError> {
    let changes = backend
        .storage()
        .find_changes_between(
            doc_info.id(),
            req_pack.checkpoint.server_seq() + 1,
            initial_server_seq,
        )
        .await?;

    if !changes.is_empty() {
        info!(
            key = %req_pack.document_key,
            from = req_pack.checkpoint.server_seq() + 1,
            to = initial_server_seq,
            pulled = changes.len(),
            checkpoint = %pushed_cp,
            "pulled changes"
        );
    }
    Ok(ChangePack::new(
        req_pack.document_key.clone(),
        pushed_cp,
        changes,
        None,
    ))
}

async fn pull_snapshot(
    backend: &Arc<Backend>,
    doc_info: &DocInfo,
    req_pack: &ChangePack,
    pushed_cp: Checkpoint,
    initial_server_seq: u64,
) -> Result<ChangePack, SyncError> {
    let snapshot_info = backend
        .storage()
        .find_closest_snapshot_info(doc_info.id(), initial_server_seq)
        .await?;
    let covered = snapshot_info.as_ref().map_or(0, |info| info.server_seq);

    let changes = backend
        .storage()
        .find_changes_between(doc_info.id(), covered + 1, initial_server_seq)
        .await?;
    let snapshot = backend
        .materializer()
        .materialize(
            snapshot_info.as_ref().map(|info| &info.snapshot),
            &changes,
            None,
        )
        .context(pack_error::MaterializeSnafu)?;

    info!(
        key = %req_pack.document_key,
        server_seq = initial_server_seq,
        snapshot_bytes = snapshot.len(),
        checkpoint = %pushed_cp,
        "pulled snapshot"
    );
    Ok(ChangePack::new(
        req_pack.document_key.clone(),
        pushed_cp,
        Vec::new(),
        Some(snapshot),
    ))
}

/// The asynchronous tail: publish the change event and opportunistically
/// store a snapshot. Never propagates failures; the response has already
/// been returned.
async fn publish_and_snapshot(
    backend: Arc<Backend>,
    publisher: ActorId,
    doc_info: DocInfo,
    min_synced_ticket: TimeTicket,
) {
    let document_key = doc_info.key().clone();
    let mut locker = backend.coordinator().new_locker(snapshot_key(&document_key));
    // Another worker is already snapshotting this document; the stored
    // result would be the same, so there is nothing to do.
    if locker.try_lock().await.is_err() {
        return;
    }

    let event = DocEvent::documents_changed(publisher, vec![document_key.clone()]);
    if let Err(err) = backend.coordinator().publish(publisher, event).await {
        error!(key = %document_key, error = %err, "failed to publish document event");
    }

    let start = Instant::now();
    if let Err(err) = store_snapshot(&backend, &doc_info, &min_synced_ticket).await {
        error!(key = %document_key, error = %err, "failed to store snapshot");
    } else {
        debug!(
            key = %document_key,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "snapshot pass finished"
        );
    }

    if let Err(err) = locker.unlock().await {
        error!(key = %document_key, error = %err, "failed to release snapshot lock");
    }
}
