//! In-memory storage for single-node deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::document::Change;
use crate::document::DocumentKey;
use crate::document::MAX_DELIMITER;
use crate::document::TimeTicket;
use crate::storage::Storage;
use crate::storage::StorageError;
use crate::storage::error;
use crate::storage::types::ChangeInfo;
use crate::storage::types::ClientId;
use crate::storage::types::ClientInfo;
use crate::storage::types::DocId;
use crate::storage::types::DocInfo;
use crate::storage::types::SnapshotInfo;
use crate::storage::types::SyncedSeqInfo;
use crate::storage::types::now_unix_ms;

#[derive(Default)]
struct Inner {
    clients: HashMap<ClientId, ClientInfo>,
    docs: HashMap<DocId, DocInfo>,
    doc_keys: HashMap<String, DocId>,
    /// Per document, ordered by server sequence with no gaps.
    changes: HashMap<DocId, Vec<ChangeInfo>>,
    /// Per document, ordered by covered server sequence.
    snapshots: HashMap<DocId, Vec<SnapshotInfo>>,
    synced_seqs: HashMap<(DocId, ClientId), SyncedSeqInfo>,
}

/// [`Storage`] backed by process memory.
///
/// All writes that the trait declares conditional are checked under one
/// write lock, so the optimistic-concurrency contract holds exactly.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn find_client_info(&self, client_id: ClientId) -> Result<ClientInfo, StorageError> {
        self.inner
            .read()
            .clients
            .get(&client_id)
            .cloned()
            .ok_or_else(|| error::ClientNotFoundSnafu { client_id }.build())
    }

    async fn update_client_info(&self, client_info: &ClientInfo) -> Result<(), StorageError> {
        self.inner
            .write()
            .clients
            .insert(client_info.id(), client_info.clone());
        Ok(())
    }

    async fn find_or_create_doc_info(&self, key: &DocumentKey) -> Result<DocInfo, StorageError> {
        let mut inner = self.inner.write();
        if let Some(doc_id) = inner.doc_keys.get(&key.combined()) {
            let doc_id = *doc_id;
            return inner
                .docs
                .get(&doc_id)
                .cloned()
                .ok_or_else(|| error::DocumentNotFoundSnafu { doc_id }.build());
        }

        let doc_info = DocInfo::new(DocId::random(), key.clone());
        inner.doc_keys.insert(key.combined(), doc_info.id());
        inner.docs.insert(doc_info.id(), doc_info.clone());
        debug!(key = %key, doc_id = %doc_info.id(), "created document");
        Ok(doc_info)
    }

    async fn find_doc_info(&self, doc_id: DocId) -> Result<DocInfo, StorageError> {
        self.inner
            .read()
            .docs
            .get(&doc_id)
            .cloned()
            .ok_or_else(|| error::DocumentNotFoundSnafu { doc_id }.build())
    }

    async fn create_change_infos(
        &self,
        doc_info: &DocInfo,
        initial_server_seq: u64,
        changes: &[Change],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let doc_id = doc_info.id();

        let stored = inner
            .docs
            .get(&doc_id)
            .ok_or_else(|| error::DocumentNotFoundSnafu { doc_id }.build())?;
        if stored.server_seq() != initial_server_seq {
            return error::ConflictSnafu {
                doc_id,
                expected_server_seq: initial_server_seq,
            }
            .fail();
        }

        let mut next_seq = initial_server_seq;
        let mut infos = Vec::with_capacity(changes.len());
        for change in changes {
            let info = ChangeInfo::from_change(doc_id, change).ok_or_else(|| {
                error::InternalSnafu {
                    message: "pushed change missing server seq".to_string(),
                }
                .build()
            })?;
            next_seq += 1;
            if info.server_seq != next_seq {
                return error::InternalSnafu {
                    message: format!(
                        "server seq gap: expected {next_seq}, got {}",
                        info.server_seq
                    ),
                }
                .fail();
            }
            infos.push(info);
        }
        if next_seq != doc_info.server_seq() {
            return error::InternalSnafu {
                message: format!(
                    "document cursor {} does not cover appended seq {next_seq}",
                    doc_info.server_seq()
                ),
            }
            .fail();
        }

        inner.changes.entry(doc_id).or_default().extend(infos);
        inner.docs.insert(doc_id, doc_info.clone());
        Ok(())
    }

    async fn update_client_info_after_push_pull(
        &self,
        client_info: &ClientInfo,
        _doc_info: &DocInfo,
    ) -> Result<(), StorageError> {
        self.inner
            .write()
            .clients
            .insert(client_info.id(), client_info.clone());
        Ok(())
    }

    async fn find_changes_between(
        &self,
        doc_id: DocId,
        from: u64,
        to: u64,
    ) -> Result<Vec<Change>, StorageError> {
        let inner = self.inner.read();
        let changes = inner
            .changes
            .get(&doc_id)
            .map(|changes| {
                changes
                    .iter()
                    .filter(|info| info.server_seq >= from && info.server_seq <= to)
                    .map(ChangeInfo::to_change)
                    .collect()
            })
            .unwrap_or_default();
        Ok(changes)
    }

    async fn update_and_find_min_synced_ticket(
        &self,
        client_info: &ClientInfo,
        doc_id: DocId,
        server_seq: u64,
    ) -> Result<TimeTicket, StorageError> {
        let mut inner = self.inner.write();

        let ticket = if server_seq == 0 {
            TimeTicket::INITIAL
        } else {
            let info = inner
                .changes
                .get(&doc_id)
                .and_then(|changes| {
                    changes.iter().find(|info| info.server_seq == server_seq)
                })
                .ok_or_else(|| {
                    error::InternalSnafu {
                        message: format!("no change at server seq {server_seq}"),
                    }
                    .build()
                })?;
            TimeTicket::new(info.lamport, MAX_DELIMITER, info.actor)
        };

        // A detached client must stop holding the GC horizon back.
        if client_info.is_attached(doc_id) {
            inner.synced_seqs.insert(
                (doc_id, client_info.id()),
                SyncedSeqInfo {
                    doc_id,
                    client_id: client_info.id(),
                    ticket,
                },
            );
        } else {
            inner.synced_seqs.remove(&(doc_id, client_info.id()));
        }

        let mut attached: Vec<ClientId> = inner
            .clients
            .values()
            .filter(|client| client.is_attached(doc_id))
            .map(ClientInfo::id)
            .collect();
        // The caller's copy may be newer than the stored record.
        if client_info.is_attached(doc_id) {
            if !attached.contains(&client_info.id()) {
                attached.push(client_info.id());
            }
        } else {
            attached.retain(|id| *id != client_info.id());
        }

        if attached.is_empty() {
            return Ok(TimeTicket::INITIAL);
        }

        let min = attached
            .iter()
            .filter_map(|client_id| inner.synced_seqs.get(&(doc_id, *client_id)))
            .map(|info| info.ticket)
            .min();
        Ok(min.unwrap_or(TimeTicket::INITIAL))
    }

    async fn find_closest_snapshot_info(
        &self,
        doc_id: DocId,
        server_seq: u64,
    ) -> Result<Option<SnapshotInfo>, StorageError> {
        let inner = self.inner.read();
        let snapshot = inner.snapshots.get(&doc_id).and_then(|snapshots| {
            snapshots
                .iter()
                .rev()
                .find(|info| info.server_seq <= server_seq)
                .cloned()
        });
        Ok(snapshot)
    }

    async fn create_snapshot_info(
        &self,
        doc_id: DocId,
        server_seq: u64,
        snapshot: Bytes,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let snapshots = inner.snapshots.entry(doc_id).or_default();
        // Re-running the worker at an unchanged horizon is a no-op.
        if snapshots.last().is_some_and(|last| last.server_seq >= server_seq) {
            return Ok(());
        }
        snapshots.push(SnapshotInfo {
            doc_id,
            server_seq,
            snapshot,
            created_at: now_unix_ms(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::document::ActorId;
    use crate::document::ChangeId;
    use crate::document::Checkpoint;

    fn doc_key(name: &str) -> DocumentKey {
        DocumentKey::new("tests", name).unwrap()
    }

    fn stamped_change(actor: ActorId, client_seq: u32, lamport: u64, server_seq: u64) -> Change {
        let id = ChangeId::new(client_seq, lamport, actor).with_server_seq(server_seq);
        Change::new(id, None, vec![Bytes::from_static(b"op")])
    }

    #[tokio::test]
    async fn conditional_append_rejects_drift() {
        let storage = MemoryStorage::new();
        let mut doc = storage.find_or_create_doc_info(&doc_key("drift")).await.unwrap();
        let actor = ActorId::random();

        doc.increase_server_seq();
        storage
            .create_change_infos(&doc, 0, &[stamped_change(actor, 1, 1, 1)])
            .await
            .unwrap();

        // A writer still based on the old cursor must be rejected.
        let mut stale = doc.clone();
        stale.increase_server_seq();
        let err = storage
            .create_change_infos(&stale, 0, &[stamped_change(actor, 2, 2, 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn appended_sequences_stay_dense() {
        let storage = MemoryStorage::new();
        let mut doc = storage.find_or_create_doc_info(&doc_key("dense")).await.unwrap();
        let actor = ActorId::random();

        for round in 0u64..3 {
            let initial = doc.server_seq();
            let changes: Vec<Change> = (0..4)
                .map(|i| {
                    let seq = doc.increase_server_seq();
                    stamped_change(actor, (round * 4 + i + 1) as u32, round * 4 + i + 1, seq)
                })
                .collect();
            storage.create_change_infos(&doc, initial, &changes).await.unwrap();
        }

        let changes = storage.find_changes_between(doc.id(), 1, 12).await.unwrap();
        let seqs: Vec<u64> = changes.iter().filter_map(|c| c.id().server_seq()).collect();
        assert_eq!(seqs, (1..=12).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn min_synced_ticket_tracks_attached_clients() {
        let storage = MemoryStorage::new();
        let mut doc = storage.find_or_create_doc_info(&doc_key("min")).await.unwrap();

        let mut slow = ClientInfo::new(ClientId::random());
        let mut fast = ClientInfo::new(ClientId::random());
        slow.attach_document(doc.id()).unwrap();
        fast.attach_document(doc.id()).unwrap();
        storage.update_client_info(&slow).await.unwrap();
        storage.update_client_info(&fast).await.unwrap();

        let actor = ActorId::from(fast.id());
        let initial = doc.server_seq();
        let changes: Vec<Change> = (1..=2)
            .map(|i| {
                let seq = doc.increase_server_seq();
                stamped_change(actor, i as u32, i, seq)
            })
            .collect();
        storage.create_change_infos(&doc, initial, &changes).await.unwrap();

        let min = storage
            .update_and_find_min_synced_ticket(&slow, doc.id(), 1)
            .await
            .unwrap();
        assert_eq!(min.lamport(), 1);

        // The faster client does not move the minimum.
        let min = storage
            .update_and_find_min_synced_ticket(&fast, doc.id(), 2)
            .await
            .unwrap();
        assert_eq!(min.lamport(), 1);

        // Detaching the slow client releases the horizon.
        slow.detach_document(doc.id()).unwrap();
        storage.update_client_info(&slow).await.unwrap();
        let min = storage
            .update_and_find_min_synced_ticket(&slow, doc.id(), 1)
            .await
            .unwrap();
        assert_eq!(min.lamport(), 2);
    }

    #[tokio::test]
    async fn min_synced_ticket_is_initial_without_attached_clients() {
        let storage = MemoryStorage::new();
        let doc = storage.find_or_create_doc_info(&doc_key("empty")).await.unwrap();
        let client = ClientInfo::new(ClientId::random());
        let min = storage
            .update_and_find_min_synced_ticket(&client, doc.id(), 0)
            .await
            .unwrap();
        assert_eq!(min, TimeTicket::INITIAL);
    }

    #[tokio::test]
    async fn closest_snapshot_respects_upper_bound() {
        let storage = MemoryStorage::new();
        let doc = storage.find_or_create_doc_info(&doc_key("snap")).await.unwrap();

        storage
            .create_snapshot_info(doc.id(), 5, Bytes::from_static(b"five"))
            .await
            .unwrap();
        storage
            .create_snapshot_info(doc.id(), 9, Bytes::from_static(b"nine"))
            .await
            .unwrap();

        let found = storage.find_closest_snapshot_info(doc.id(), 7).await.unwrap().unwrap();
        assert_eq!(found.server_seq, 5);
        let found = storage.find_closest_snapshot_info(doc.id(), 20).await.unwrap().unwrap();
        assert_eq!(found.server_seq, 9);
        assert!(storage.find_closest_snapshot_info(doc.id(), 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_survives_round_trip() {
        let storage = MemoryStorage::new();
        let doc = storage.find_or_create_doc_info(&doc_key("cp")).await.unwrap();
        let mut client = ClientInfo::new(ClientId::random());
        client.attach_document(doc.id()).unwrap();
        client.update_checkpoint(doc.id(), Checkpoint::new(4, 11)).unwrap();
        storage.update_client_info_after_push_pull(&client, &doc).await.unwrap();

        let loaded = storage.find_client_info(client.id()).await.unwrap();
        assert_eq!(loaded.checkpoint_of(doc.id()), Checkpoint::new(4, 11));
    }
}
