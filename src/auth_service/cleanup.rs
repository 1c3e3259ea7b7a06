use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fitcenter_db::{AuthStorage, StoreResult};
use tokio::task::JoinHandle;
use tokio::time;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Background task that periodically purges expired and revoked sessions
///
/// Validation never depends on this task; it only bounds the size of the
/// session table. Deletes are row-level and run alongside reads.
pub struct SessionCleanupTask {
    storage: Arc<dyn AuthStorage>,
    cleanup_interval: Duration,
}

impl SessionCleanupTask {
    /// Create a new cleanup task; intervals below one second are raised to it
    pub fn new(storage: Arc<dyn AuthStorage>, cleanup_interval: Duration) -> Self {
        Self {
            storage,
            cleanup_interval: cleanup_interval.max(MIN_INTERVAL),
        }
    }

    /// One purge pass
    pub async fn run_once(&self) -> StoreResult<u64> {
        self.storage.purge_sessions(Utc::now()).await
    }

    /// Purge immediately, then every `cleanup_interval`, forever
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.cleanup_interval.as_secs(),
            "Starting session cleanup task"
        );

        let mut interval = time::interval(self.cleanup_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.run_once().await {
                Ok(0) => tracing::debug!("No expired or revoked sessions to clean up"),
                Ok(deleted_count) => {
                    tracing::info!(deleted_count, "Cleaned up expired and revoked sessions");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to clean up sessions");
                }
            }
        }
    }

    /// Run on the current runtime; abort the handle to stop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
