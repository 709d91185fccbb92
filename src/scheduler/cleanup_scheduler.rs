//! Background purge of old task-log history (spec §4.6's housekeeping
//! counterpart): `task_logs` and `task_status` rows past a retention window
//! are deleted on a fixed interval, independent of the cron-driven renewal
//! sweep.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::error::Result;
use crate::store::Store;

/// How long a finished task's log lines and status row are kept before
/// being purged.
const DEFAULT_RETENTION: chrono::Duration = chrono::Duration::days(7);

/// Periodically purges `task_logs`/`task_status` rows older than the
/// retention window.
pub struct CleanupScheduler {
    store: Store,
    interval: Duration,
    retention: chrono::Duration,
}

impl CleanupScheduler {
    pub fn new(store: Store, interval: Duration) -> Self {
        Self {
            store,
            interval,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Start the cleanup loop. Runs forever; intended to be spawned once at
    /// process start alongside the renewal scheduler.
    pub async fn run(self) {
        info!(interval = ?self.interval, "starting cleanup scheduler");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            if let Err(e) = self.perform_cleanup().await {
                error!(error = %e, "cleanup task failed");
            }
        }
    }

    async fn perform_cleanup(&self) -> Result<()> {
        let cutoff = Utc::now() - self.retention;
        let logs_removed = self.store.task_logs.cleanup_before(cutoff).await?;
        let status_removed = self.store.task_status.cleanup_before(cutoff).await?;
        if logs_removed > 0 || status_removed > 0 {
            info!(logs_removed, status_removed, "cleanup purged old task history");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cleanup_with_empty_store_is_a_noop() {
        let store = Store::open_in_memory([3u8; 32], b"seed".to_vec()).await.unwrap();
        let scheduler = CleanupScheduler::new(store, Duration::from_secs(3600));
        scheduler.perform_cleanup().await.unwrap();
    }
}
