//! In-process coordinator for single-node deployments.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::mpsc;
use tracing::debug;

use crate::coordination::CoordinationError;
use crate::coordination::Coordinator;
use crate::coordination::DocEvent;
use crate::coordination::LockKey;
use crate::coordination::Locker;
use crate::coordination::Subscription;
use crate::coordination::error;
use crate::document::ActorId;
use crate::document::DocumentKey;

struct Subscriber {
    actor: ActorId,
    sender: mpsc::UnboundedSender<DocEvent>,
}

/// [`Coordinator`] backed by in-process keyed mutexes and channels.
///
/// Mutual exclusion spans one process only, which matches the
/// single-node deployment mode. The lock table retains an entry per key
/// ever locked; keys are document-derived and bounded by the working
/// set.
#[derive(Default)]
pub struct MemoryCoordinator {
    locks: DashMap<String, Arc<Mutex<()>>>,
    subscribers: DashMap<String, Vec<Subscriber>>,
}

impl MemoryCoordinator {
    /// Create a coordinator with no locks or subscribers.
    pub fn new() -> Self {
        MemoryCoordinator::default()
    }

    fn mutex_for(&self, key: &LockKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

struct MemoryLocker {
    key: LockKey,
    mutex: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl Locker for MemoryLocker {
    async fn lock(&mut self) -> Result<(), CoordinationError> {
        let guard = self.mutex.clone().lock_owned().await;
        self.guard = Some(guard);
        Ok(())
    }

    async fn try_lock(&mut self) -> Result<(), CoordinationError> {
        match self.mutex.clone().try_lock_owned() {
            Ok(guard) => {
                self.guard = Some(guard);
                Ok(())
            }
            Err(_) => error::LockHeldSnafu {
                key: self.key.as_str(),
            }
            .fail(),
        }
    }

    async fn unlock(&mut self) -> Result<(), CoordinationError> {
        match self.guard.take() {
            Some(guard) => {
                drop(guard);
                Ok(())
            }
            None => error::NotLockedSnafu {
                key: self.key.as_str(),
            }
            .fail(),
        }
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    fn new_locker(&self, key: LockKey) -> Box<dyn Locker> {
        let mutex = self.mutex_for(&key);
        Box::new(MemoryLocker {
            key,
            mutex,
            guard: None,
        })
    }

    async fn publish(&self, publisher: ActorId, event: DocEvent) -> Result<(), CoordinationError> {
        for key in &event.document_keys {
            let Some(mut subscribers) = self.subscribers.get_mut(&key.combined()) else {
                continue;
            };
            // Closed receivers are dropped on the way through.
            subscribers.retain(|subscriber| {
                if subscriber.actor == publisher {
                    return true;
                }
                subscriber.sender.send(event.clone()).is_ok()
            });
        }
        debug!(publisher = %publisher, keys = event.document_keys.len(), "published doc event");
        Ok(())
    }

    async fn subscribe(
        &self,
        subscriber: ActorId,
        keys: &[DocumentKey],
    ) -> Result<Subscription, CoordinationError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        for key in keys {
            self.subscribers
                .entry(key.combined())
                .or_default()
                .push(Subscriber {
                    actor: subscriber,
                    sender: sender.clone(),
                });
        }
        Ok(Subscription::new(subscriber, receiver))
    }

    async fn unsubscribe(
        &self,
        subscriber: ActorId,
        keys: &[DocumentKey],
    ) -> Result<(), CoordinationError> {
        for key in keys {
            if let Some(mut subscribers) = self.subscribers.get_mut(&key.combined()) {
                subscribers.retain(|entry| entry.actor != subscriber);
            }
        }
        Ok(())
    }
}
