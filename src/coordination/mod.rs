//! Cluster-wide coordination primitives.
//!
//! The engine needs two capabilities from its surroundings: named locks
//! with cluster-wide mutual exclusion (serializing per-document critical
//! sections and electing a single snapshot writer) and a publish channel
//! that fans document-change events out to subscribers on any node.
//!
//! [`MemoryCoordinator`] backs both with in-process primitives for
//! single-node deployments; multi-node deployments implement the traits
//! over a lease-based store.

mod error;
mod event;
mod memory;

use std::fmt;

use async_trait::async_trait;

pub use error::CoordinationError;
pub use event::DocEvent;
pub use event::DocEventKind;
pub use memory::MemoryCoordinator;

use crate::document::ActorId;
use crate::document::DocumentKey;

/// Name of a cluster-wide lock.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Create a lock key.
    pub fn new(name: impl Into<String>) -> Self {
        LockKey(name.into())
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockKey({})", self.0)
    }
}

/// A handle on one named cluster-wide lock.
///
/// Handles are single-holder state machines: `unlock` releases what the
/// same handle acquired, and dropping a locked handle releases it.
#[async_trait]
pub trait Locker: Send {
    /// Acquire the lock, waiting for the current holder if necessary.
    async fn lock(&mut self) -> Result<(), CoordinationError>;

    /// Acquire the lock only if it is free, failing with
    /// [`CoordinationError::LockHeld`] otherwise.
    async fn try_lock(&mut self) -> Result<(), CoordinationError>;

    /// Release the lock held by this handle.
    async fn unlock(&mut self) -> Result<(), CoordinationError>;
}

/// Receives document events published anywhere in the cluster.
pub struct Subscription {
    subscriber: ActorId,
    receiver: tokio::sync::mpsc::UnboundedReceiver<DocEvent>,
}

impl Subscription {
    pub(crate) fn new(
        subscriber: ActorId,
        receiver: tokio::sync::mpsc::UnboundedReceiver<DocEvent>,
    ) -> Self {
        Subscription {
            subscriber,
            receiver,
        }
    }

    /// The subscribing actor.
    pub fn subscriber(&self) -> ActorId {
        self.subscriber
    }

    /// Wait for the next event. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<DocEvent> {
        self.receiver.recv().await
    }
}

/// Cluster-wide named locks plus document event fan-out.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// A handle on the named lock.
    fn new_locker(&self, key: LockKey) -> Box<dyn Locker>;

    /// Deliver an event to every subscriber of its document keys except
    /// the publisher itself.
    async fn publish(&self, publisher: ActorId, event: DocEvent) -> Result<(), CoordinationError>;

    /// Subscribe to events for the given documents.
    async fn subscribe(
        &self,
        subscriber: ActorId,
        keys: &[DocumentKey],
    ) -> Result<Subscription, CoordinationError>;

    /// Drop a subscriber's registrations for the given documents.
    async fn unsubscribe(
        &self,
        subscriber: ActorId,
        keys: &[DocumentKey],
    ) -> Result<(), CoordinationError>;
}
