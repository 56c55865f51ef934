//! Two-TTL cache for webhook decisions.

use std::num::NonZeroUsize;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;

/// A cached webhook decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CachedDecision {
    /// The call was allowed.
    Allowed,
    /// The call was denied with the stored reason.
    Denied {
        /// The decision service's grounds.
        reason: String,
    },
}

struct Entry {
    decision: CachedDecision,
    expires_at: Instant,
}

/// LRU cache of webhook decisions keyed by the exact serialized request.
///
/// Allow and deny entries carry their own TTLs, configured
/// independently: allows are typically cached longer than denials so a
/// permission grant propagates quickly.
pub struct AuthWebhookCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl AuthWebhookCache {
    /// Create a cache bounded to `capacity` fingerprints.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        AuthWebhookCache {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The live decision for a fingerprint, dropping it when expired.
    pub fn get(&self, fingerprint: &str) -> Option<CachedDecision> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(fingerprint) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.decision.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(fingerprint);
        }
        None
    }

    /// Store a decision under its TTL.
    pub fn put(&self, fingerprint: String, decision: CachedDecision, ttl: Duration) {
        let entry = Entry {
            decision,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().put(fingerprint, entry);
    }
}
