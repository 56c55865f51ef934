//! The wiring bundle shared by all components.
//!
//! A [`Backend`] owns the configuration and the handles every component
//! needs: storage, coordinator, materializer, the webhook decision cache
//! and HTTP client, and the background task group. Components receive an
//! `Arc<Backend>` and treat it as read-only after construction; the
//! bundle expresses wiring, not ownership of request state.

mod background;
mod config;

use std::sync::Arc;
use std::time::Duration;

pub use background::BackgroundGroup;
pub use config::AuthWebhookConfig;
pub use config::Config;
pub use config::ConfigError;
pub use config::DEFAULT_SNAPSHOT_INTERVAL;
pub use config::DEFAULT_SNAPSHOT_THRESHOLD;

use crate::auth::AuthWebhookCache;
use crate::coordination::Coordinator;
use crate::coordination::MemoryCoordinator;
use crate::document::Materializer;
use crate::document::OpaqueMaterializer;
use crate::storage::MemoryStorage;
use crate::storage::Storage;

/// Shared handles of a running synchronization core.
pub struct Backend {
    config: Config,
    storage: Arc<dyn Storage>,
    coordinator: Arc<dyn Coordinator>,
    materializer: Arc<dyn Materializer>,
    auth_cache: AuthWebhookCache,
    webhook_client: reqwest::Client,
    background: BackgroundGroup,
}

impl Backend {
    /// Wire a backend from its collaborators.
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        coordinator: Arc<dyn Coordinator>,
        materializer: Arc<dyn Materializer>,
    ) -> Self {
        let auth_cache = AuthWebhookCache::new(config.auth_webhook.cache_size);
        Backend {
            config,
            storage,
            coordinator,
            materializer,
            auth_cache,
            webhook_client: reqwest::Client::new(),
            background: BackgroundGroup::new(),
        }
    }

    /// A single-node backend on in-process storage and coordination.
    pub fn memory(config: Config) -> Self {
        Backend::new(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryCoordinator::new()),
            Arc::new(OpaqueMaterializer),
        )
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The storage layer.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The coordinator.
    pub fn coordinator(&self) -> &Arc<dyn Coordinator> {
        &self.coordinator
    }

    /// The CRDT materializer.
    pub fn materializer(&self) -> &Arc<dyn Materializer> {
        &self.materializer
    }

    /// The webhook decision cache.
    pub fn auth_cache(&self) -> &AuthWebhookCache {
        &self.auth_cache
    }

    /// The HTTP client used for webhook calls.
    pub fn webhook_client(&self) -> &reqwest::Client {
        &self.webhook_client
    }

    /// The background task group.
    pub fn background(&self) -> &BackgroundGroup {
        &self.background
    }

    /// Cancel background work and drain it with a grace period.
    pub async fn shutdown(&self, grace: Duration) {
        self.background.shutdown(grace).await;
    }
}
