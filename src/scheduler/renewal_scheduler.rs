//! Cron-driven renewal sweep (spec §4.5). Grounded in the cron-wrapper
//! pattern from the cloudillo scheduler (`croner::Cron` +
//! `find_next_occurrence`), generalized here to a single-purpose sweep loop
//! rather than a generic task graph: each tick selects renewal candidates
//! and runs them with bounded concurrency, and a non-reentrant gate skips a
//! tick that would overlap a still-running sweep.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use croner::Cron;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{AcmeEngine, CertRequest, TaskType};
use crate::error::{AcmeError, Result};
use crate::notifications::{NotificationDispatcher, NotificationEvent};
use crate::store::Store;
use crate::types::ChallengeType;

/// How many certificates are renewed concurrently within one sweep
/// (spec §4.5 step 3: a small fixed parallelism, 2-4).
const DEFAULT_SWEEP_CONCURRENCY: usize = 4;

/// Cron-driven sweep over certificates due for renewal. One sweep at a time
/// runs; an overlapping tick is logged and skipped rather than queued.
pub struct RenewalScheduler {
    store: Store,
    engine: Arc<AcmeEngine>,
    notifications: NotificationDispatcher,
    cron: Cron,
    renew_before_days: i64,
    concurrency: usize,
    /// Non-reentrant gate: `true` while a sweep is in flight.
    sweeping: Arc<AtomicBool>,
}

impl RenewalScheduler {
    pub fn new(
        store: Store,
        engine: Arc<AcmeEngine>,
        notifications: NotificationDispatcher,
        cron_expr: &str,
        renew_before_days: i64,
    ) -> Result<Self> {
        let cron = Cron::from_str(cron_expr)
            .map_err(|e| AcmeError::scheduler(format!("invalid cron expression '{cron_expr}': {e}")))?;
        Ok(Self {
            store,
            engine,
            notifications,
            cron,
            renew_before_days,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
            sweeping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Run forever: sleep until the next cron occurrence, then sweep.
    /// Intended to be spawned once at process start.
    pub async fn run(self: Arc<Self>) {
        loop {
            let now = Utc::now();
            let next = match self.cron.find_next_occurrence(&now, false) {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, "failed to compute next renewal sweep time; retrying in 1h");
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    continue;
                }
            };
            let wait = (next - now).to_std().unwrap_or(std::time::Duration::from_secs(60));
            tokio::time::sleep(wait).await;
            self.tick().await;
        }
    }

    /// Run exactly one sweep, skipping if another is already in flight.
    pub async fn tick(&self) {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("renewal sweep tick skipped: previous sweep still in flight");
            return;
        }

        if let Err(e) = self.sweep().await {
            warn!(error = %e, "renewal sweep failed");
        }

        self.sweeping.store(false, Ordering::SeqCst);
    }

    async fn sweep(&self) -> Result<()> {
        let due = self
            .store
            .certificates
            .due_for_renewal(Utc::now(), self.renew_before_days)
            .await?;
        if due.is_empty() {
            return Ok(());
        }
        info!(count = due.len(), "renewal sweep found candidates");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(due.len());

        for cert in due {
            let semaphore = Arc::clone(&semaphore);
            let engine = Arc::clone(&self.engine);
            let notifications = self.notifications.clone();
            let domain = cert.domain.clone();

            let challenge_type = match cert.challenge_type.as_str() {
                "http-01" => ChallengeType::Http01,
                "tls-alpn-01" => ChallengeType::TlsAlpn01,
                _ => ChallengeType::Dns01,
            };
            let request = CertRequest {
                domain: cert.domain.clone(),
                san: cert.san.clone(),
                challenge_type,
                dns_provider_id: cert.dns_provider_id,
                workspace_id: cert.workspace_id,
                cert_id: cert.id,
                task_type: TaskType::Renew,
            };

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let task_id = format!("renew-{}", Uuid::new_v4());
                match engine.process(&task_id, request).await {
                    Ok(()) => {
                        notifications
                            .dispatch(NotificationEvent::new(
                                "Certificate renewed",
                                format!("{domain} renewed successfully"),
                                "renewal",
                            ))
                            .await;
                    }
                    Err(e) => {
                        notifications
                            .dispatch(NotificationEvent::new(
                                "Certificate renewal failed",
                                format!("{domain} failed to renew: {e}"),
                                "renewal",
                            ))
                            .await;
                    }
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasklog::TaskLogBus;

    async fn test_scheduler() -> Arc<RenewalScheduler> {
        let store = Store::open_in_memory([9u8; 32], b"agent-secret".to_vec())
            .await
            .unwrap();
        let tasklog = TaskLogBus::new(store.task_logs.clone(), store.task_status.clone());
        let engine = Arc::new(AcmeEngine::new(
            store.clone(),
            tasklog,
            "127.0.0.1:0".parse().unwrap(),
        ));
        let notifications = NotificationDispatcher::new(store.notification_channels.clone());
        Arc::new(RenewalScheduler::new(store, engine, notifications, "0 3 * * *", 30).unwrap())
    }

    #[tokio::test]
    async fn test_sweep_with_no_candidates_is_a_noop() {
        let scheduler = test_scheduler().await;
        scheduler.tick().await;
        assert!(!scheduler.sweeping.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_invalid_cron_expression_is_rejected() {
        let store = Store::open_in_memory([9u8; 32], b"agent-secret".to_vec())
            .await
            .unwrap();
        let tasklog = TaskLogBus::new(store.task_logs.clone(), store.task_status.clone());
        let engine = Arc::new(AcmeEngine::new(
            store.clone(),
            tasklog,
            "127.0.0.1:0".parse().unwrap(),
        ));
        let notifications = NotificationDispatcher::new(store.notification_channels.clone());
        assert!(RenewalScheduler::new(store, engine, notifications, "not a cron", 30).is_err());
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let scheduler = test_scheduler().await;
        scheduler.sweeping.store(true, Ordering::SeqCst);
        scheduler.tick().await;
        assert!(scheduler.sweeping.load(Ordering::SeqCst));
        scheduler.sweeping.store(false, Ordering::SeqCst);
    }
}
