//! Background task group tied to the server lifecycle.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// Detached tasks that outlive the request that spawned them.
///
/// The snapshot tail of a PushPull runs here so a dropped client
/// connection does not abort opportunistic snapshotting. On shutdown the
/// group is canceled and drained with a grace period.
pub struct BackgroundGroup {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl Default for BackgroundGroup {
    fn default() -> Self {
        BackgroundGroup::new()
    }
}

impl BackgroundGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        BackgroundGroup {
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
        }
    }

    /// Launch a tracked detached task.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// The lifecycle token handed to detached tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Number of tasks currently tracked.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Whether no tasks are tracked.
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait for currently running tasks to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel outstanding tasks and drain with a grace period.
    pub async fn shutdown(&self, grace: Duration) {
        self.token.cancel();
        self.tracker.close();
        tokio::select! {
            _ = self.tracker.wait() => {}
            _ = tokio::time::sleep(grace) => {
                warn!(remaining = self.tracker.len(), "background tasks did not drain in time");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[tokio::test]
    async fn drain_waits_for_spawned_tasks() {
        let group = BackgroundGroup::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = counter.clone();
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        group.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_long_runners() {
        let group = BackgroundGroup::new();
        let token = group.cancellation_token();
        let finished = Arc::new(AtomicUsize::new(0));
        {
            let finished = finished.clone();
            group.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                }
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        group.shutdown(Duration::from_secs(1)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
