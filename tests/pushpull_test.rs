//! End-to-end scenarios for the PushPull engine.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use larch::backend::Backend;
use larch::backend::Config;
use larch::coordination::DocEventKind;
use larch::document::ActorId;
use larch::document::Change;
use larch::document::ChangeId;
use larch::document::ChangePack;
use larch::document::Checkpoint;
use larch::document::DocumentKey;
use larch::packs;
use larch::packs::SyncError;
use larch::storage::ClientId;
use larch::storage::ClientInfo;
use larch::storage::DocId;
use larch::storage::Storage;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn test_config() -> Config {
    Config {
        // Keep snapshots out of the way unless a test asks for them.
        snapshot_threshold: 1_000,
        snapshot_interval: 1_000_000,
        ..Config::default()
    }
}

/// A simulated client session: its server-side record, its local clock
/// and the checkpoint it believes in.
struct Session {
    backend: Arc<Backend>,
    client: ClientInfo,
    doc_id: DocId,
    key: DocumentKey,
    checkpoint: Checkpoint,
    change_id: ChangeId,
}

impl Session {
    async fn attach(backend: &Arc<Backend>, key: &DocumentKey) -> Session {
        let doc = backend.storage().find_or_create_doc_info(key).await.unwrap();
        let client_id = ClientId::random();
        let mut client = ClientInfo::new(client_id);
        client.attach_document(doc.id()).unwrap();
        backend.storage().update_client_info(&client).await.unwrap();
        Session {
            backend: backend.clone(),
            client,
            doc_id: doc.id(),
            key: key.clone(),
            checkpoint: Checkpoint::INITIAL,
            change_id: ChangeId::new(0, 0, ActorId::from(client_id)),
        }
    }

    fn next_change(&mut self, payload: &[u8]) -> Change {
        self.change_id = self.change_id.next();
        Change::new(self.change_id, None, vec![Bytes::copy_from_slice(payload)])
    }

    fn request(&self, changes: Vec<Change>) -> ChangePack {
        ChangePack::new(self.key.clone(), self.checkpoint, changes, None)
    }

    async fn sync(&mut self, changes: Vec<Change>) -> Result<ChangePack, SyncError> {
        let req = self.request(changes);
        self.sync_pack(req).await
    }

    /// Replay-style entry point: send an arbitrary request pack.
    async fn sync_pack(&mut self, req: ChangePack) -> Result<ChangePack, SyncError> {
        let mut doc = self.backend.storage().find_doc_info(self.doc_id).await.unwrap();
        let resp = packs::synchronize(&self.backend, &mut self.client, &mut doc, req).await?;
        self.checkpoint = self.checkpoint.forward(&resp.checkpoint);
        for change in &resp.changes {
            self.change_id = self.change_id.sync_lamport(change.id().lamport());
        }
        Ok(resp)
    }

    async fn doc_server_seq(&self) -> u64 {
        self.backend
            .storage()
            .find_doc_info(self.doc_id)
            .await
            .unwrap()
            .server_seq()
    }

    async fn detach(&mut self) {
        self.client.detach_document(self.doc_id).unwrap();
        self.backend.storage().update_client_info(&self.client).await.unwrap();
    }
}

fn doc_key(name: &str) -> DocumentKey {
    DocumentKey::new("tests", name).unwrap()
}

#[tokio::test]
async fn empty_pull_is_a_no_op() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("empty-pull");

    let mut writer = Session::attach(&backend, &key).await;
    for i in 0..10u8 {
        let change = writer.next_change(&[i]);
        writer.sync(vec![change]).await.unwrap();
    }
    assert_eq!(writer.checkpoint, Checkpoint::new(10, 10));
    backend.background().drain().await;

    // A fully caught-up client pulls nothing and moves nothing.
    let resp = writer.sync(vec![]).await.unwrap();
    assert!(resp.changes.is_empty());
    assert!(resp.snapshot.is_none());
    assert_eq!(resp.checkpoint, Checkpoint::new(10, 10));
    assert_eq!(writer.doc_server_seq().await, 10);
    assert!(backend.background().is_empty());
}

#[tokio::test]
async fn simple_push_assigns_the_next_server_seq() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("simple-push");

    let mut session = Session::attach(&backend, &key).await;
    for i in 0..3u8 {
        let change = session.next_change(&[i]);
        session.sync(vec![change]).await.unwrap();
    }
    assert_eq!(session.checkpoint, Checkpoint::new(3, 3));

    let change = session.next_change(b"four");
    let resp = session.sync(vec![change]).await.unwrap();
    assert_eq!(resp.checkpoint, Checkpoint::new(4, 4));

    let stored = backend.storage().find_changes_between(session.doc_id, 4, 4).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id().server_seq(), Some(4));
    assert_eq!(stored[0].id().client_seq(), 4);
    backend.background().drain().await;
}

#[tokio::test]
async fn replayed_push_persists_nothing_new() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("replay");

    let mut session = Session::attach(&backend, &key).await;
    let change = session.next_change(b"once");
    let replayed_req = session.request(vec![change.clone()]);

    let first = session.sync_pack(replayed_req.clone()).await.unwrap();
    assert_eq!(first.checkpoint, Checkpoint::new(1, 1));
    assert_eq!(session.doc_server_seq().await, 1);

    // The client never saw the response and retries the same body.
    let second = session.sync_pack(replayed_req).await.unwrap();
    assert_eq!(second.checkpoint, Checkpoint::new(1, 1));
    assert_eq!(session.doc_server_seq().await, 1);
    let stored = backend.storage().find_changes_between(session.doc_id, 1, 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    backend.background().drain().await;
}

#[tokio::test]
async fn gapped_push_is_a_protocol_error() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("gap");

    let mut session = Session::attach(&backend, &key).await;
    let _skipped = session.next_change(b"one");
    let gapped = session.next_change(b"two");

    let err = session.sync(vec![gapped]).await.unwrap_err();
    assert!(matches!(err, SyncError::Protocol { .. }));
    assert_eq!(session.doc_server_seq().await, 0);
}

#[tokio::test]
async fn checkpoint_never_moves_backwards() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("monotonic");

    let mut session = Session::attach(&backend, &key).await;
    let change = session.next_change(b"a");
    let old_req = session.request(vec![change]);
    session.sync_pack(old_req.clone()).await.unwrap();
    let change = session.next_change(b"b");
    session.sync(vec![change]).await.unwrap();

    let loaded = backend.storage().find_client_info(session.client.id()).await.unwrap();
    let before = loaded.checkpoint_of(session.doc_id);
    assert_eq!(before, Checkpoint::new(2, 2));

    // Replaying the first request must not roll the stored checkpoint back.
    session.sync_pack(old_req).await.unwrap();
    let loaded = backend.storage().find_client_info(session.client.id()).await.unwrap();
    let after = loaded.checkpoint_of(session.doc_id);
    assert!(after.client_seq() >= before.client_seq());
    assert!(after.server_seq() >= before.server_seq());
    backend.background().drain().await;
}

#[tokio::test]
async fn server_sequences_are_dense_across_writers() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("dense");

    let mut alice = Session::attach(&backend, &key).await;
    let mut bob = Session::attach(&backend, &key).await;
    for round in 0..5u8 {
        let change = alice.next_change(&[round]);
        alice.sync(vec![change]).await.unwrap();
        let change = bob.next_change(&[round]);
        bob.sync(vec![change]).await.unwrap();
    }

    let doc_seq = alice.doc_server_seq().await;
    assert_eq!(doc_seq, 10);
    let stored = backend.storage().find_changes_between(alice.doc_id, 1, doc_seq).await.unwrap();
    let seqs: Vec<u64> = stored.iter().filter_map(|c| c.id().server_seq()).collect();
    assert_eq!(seqs, (1..=10).collect::<Vec<u64>>());
    backend.background().drain().await;
}

#[tokio::test]
async fn pushed_changes_come_back_in_order() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("round-trip");

    let mut alice = Session::attach(&backend, &key).await;
    let mut bob = Session::attach(&backend, &key).await;

    let changes: Vec<Change> = (0..3u8).map(|i| alice.next_change(&[i])).collect();
    alice.sync(changes).await.unwrap();

    // Bob's first sync pushes his own change and pulls Alice's history;
    // her changes arrive in her push order.
    let change = bob.next_change(b"bob");
    let resp = bob.sync(vec![change]).await.unwrap();
    let alice_actor: Vec<&Change> = resp
        .changes
        .iter()
        .filter(|c| c.id().actor() == ActorId::from(alice.client.id()))
        .collect();
    assert_eq!(alice_actor.len(), 3);
    let client_seqs: Vec<u32> = alice_actor.iter().map(|c| c.id().client_seq()).collect();
    assert_eq!(client_seqs, vec![1, 2, 3]);
    backend.background().drain().await;
}

#[tokio::test]
async fn long_gap_pull_returns_a_snapshot() {
    init_tracing();
    let config = Config {
        snapshot_threshold: 5,
        snapshot_interval: 1_000_000,
        ..Config::default()
    };
    let backend = Arc::new(Backend::memory(config));
    let key = doc_key("long-gap");

    let mut writer = Session::attach(&backend, &key).await;
    let changes: Vec<Change> = (0..10u8).map(|i| writer.next_change(&[i])).collect();
    writer.sync(changes).await.unwrap();

    let mut reader = Session::attach(&backend, &key).await;
    let resp = reader.sync(vec![]).await.unwrap();
    assert!(resp.changes.is_empty());
    let snapshot = resp.snapshot.expect("snapshot expected for a long gap");
    assert!(!snapshot.is_empty());
    assert_eq!(resp.checkpoint.server_seq(), 10);
    backend.background().drain().await;
}

#[tokio::test]
async fn min_synced_ticket_follows_the_laggard() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("laggard");

    let mut slow = Session::attach(&backend, &key).await;
    let mut fast = Session::attach(&backend, &key).await;

    let changes: Vec<Change> = (0..4u8).map(|i| fast.next_change(&[i])).collect();
    fast.sync(changes).await.unwrap();

    // The slow client acknowledges nothing yet, pinning the horizon.
    let resp = slow.sync(vec![]).await.unwrap();
    let pinned = resp.min_synced_ticket.unwrap();

    let resp = fast.sync(vec![]).await.unwrap();
    let still_pinned = resp.min_synced_ticket.unwrap();
    assert!(still_pinned <= pinned.max(still_pinned));
    assert_eq!(still_pinned.lamport(), 0);

    // Once the slow client acknowledges, the horizon may advance; it
    // must never move backwards.
    let resp = slow.sync(vec![]).await.unwrap();
    let advanced = resp.min_synced_ticket.unwrap();
    assert!(advanced >= still_pinned);

    // Detaching the laggard releases its pin entirely.
    slow.detach().await;
    let resp = fast.sync(vec![]).await.unwrap();
    let released = resp.min_synced_ticket.unwrap();
    assert!(released >= advanced);
    backend.background().drain().await;
}

#[tokio::test]
async fn concurrent_writers_on_one_base_conflict() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("conflict");

    let mut alice = Session::attach(&backend, &key).await;
    let mut bob = Session::attach(&backend, &key).await;

    // Both writers load the document at the same base, bypassing the
    // pushpull lock, as two nodes without coordination would.
    let mut alice_doc = backend.storage().find_doc_info(alice.doc_id).await.unwrap();
    let mut bob_doc = backend.storage().find_doc_info(bob.doc_id).await.unwrap();

    let change = alice.next_change(b"a");
    let req = alice.request(vec![change]);
    packs::push_pull(&backend, &mut alice.client, &mut alice_doc, req)
        .await
        .unwrap();

    let change = bob.next_change(b"b");
    let req = bob.request(vec![change]);
    let err = packs::push_pull(&backend, &mut bob.client, &mut bob_doc, req)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict { .. }));
    backend.background().drain().await;
}

#[tokio::test]
async fn mismatched_document_key_is_rejected() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("mismatch");

    let mut session = Session::attach(&backend, &key).await;
    let mut doc = backend.storage().find_doc_info(session.doc_id).await.unwrap();
    let req = ChangePack::new(doc_key("other"), Checkpoint::INITIAL, vec![], None);
    let err = packs::synchronize(&backend, &mut session.client, &mut doc, req)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::DocumentMismatch { .. }));
}

#[tokio::test]
async fn detached_clients_cannot_synchronize() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("detached");

    let mut session = Session::attach(&backend, &key).await;
    session.detach().await;
    let err = session.sync(vec![]).await.unwrap_err();
    assert!(matches!(err, SyncError::ClientNotAttached { .. }));
}

#[tokio::test]
async fn change_events_reach_watchers_after_persistence() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("events");

    let mut writer = Session::attach(&backend, &key).await;
    let watcher_actor = ActorId::random();
    let mut subscription = backend
        .coordinator()
        .subscribe(watcher_actor, std::slice::from_ref(&key))
        .await
        .unwrap();

    let change = writer.next_change(b"payload");
    writer.sync(vec![change]).await.unwrap();
    backend.background().drain().await;

    let event = subscription.recv().await.expect("event expected");
    assert_eq!(event.kind, DocEventKind::DocumentsChanged);
    assert_eq!(event.publisher, ActorId::from(writer.client.id()));
    assert_eq!(event.document_keys, vec![key.clone()]);

    // The change the event advertises is already readable.
    let stored = backend.storage().find_changes_between(writer.doc_id, 1, 1).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn snapshot_worker_is_singleton_per_document() {
    init_tracing();
    let config = Config {
        snapshot_threshold: 1_000,
        snapshot_interval: 1,
        ..Config::default()
    };
    let backend = Arc::new(Backend::memory(config));
    let key = doc_key("singleton");

    let mut writer = Session::attach(&backend, &key).await;

    // Hold the snapshot lock, standing in for a worker on another node.
    let mut foreign = backend.coordinator().new_locker(packs::snapshot_key(&key));
    foreign.try_lock().await.unwrap();

    let change = writer.next_change(b"one");
    writer.sync(vec![change]).await.unwrap();
    backend.background().drain().await;
    let stored = backend
        .storage()
        .find_closest_snapshot_info(writer.doc_id, u64::MAX)
        .await
        .unwrap();
    assert!(stored.is_none(), "blocked worker must not snapshot");

    foreign.unlock().await.unwrap();

    let change = writer.next_change(b"two");
    writer.sync(vec![change]).await.unwrap();
    backend.background().drain().await;
    let stored = backend
        .storage()
        .find_closest_snapshot_info(writer.doc_id, u64::MAX)
        .await
        .unwrap()
        .expect("snapshot expected after the lock is free");
    assert_eq!(stored.server_seq, 2);
}

#[tokio::test]
async fn snapshot_respects_the_interval_gate() {
    init_tracing();
    let config = Config {
        snapshot_threshold: 1_000,
        snapshot_interval: 3,
        ..Config::default()
    };
    let backend = Arc::new(Backend::memory(config));
    let key = doc_key("interval");

    let mut writer = Session::attach(&backend, &key).await;
    for i in 0..2u8 {
        let change = writer.next_change(&[i]);
        writer.sync(vec![change]).await.unwrap();
    }
    backend.background().drain().await;
    let stored = backend
        .storage()
        .find_closest_snapshot_info(writer.doc_id, u64::MAX)
        .await
        .unwrap();
    assert!(stored.is_none(), "too few changes for a snapshot");

    let change = writer.next_change(b"third");
    writer.sync(vec![change]).await.unwrap();
    backend.background().drain().await;
    let stored = backend
        .storage()
        .find_closest_snapshot_info(writer.doc_id, u64::MAX)
        .await
        .unwrap()
        .expect("interval reached");
    assert_eq!(stored.server_seq, 3);
}

#[tokio::test]
async fn shutdown_drains_pending_tails() {
    init_tracing();
    let backend = Arc::new(Backend::memory(test_config()));
    let key = doc_key("shutdown");

    let mut writer = Session::attach(&backend, &key).await;
    let change = writer.next_change(b"bye");
    writer.sync(vec![change]).await.unwrap();
    backend.shutdown(Duration::from_secs(1)).await;
    assert!(backend.background().is_empty());
}
