//! Task-log bus (spec §4.6): one of the three core subsystems. Every
//! long-running operation (issuance, renewal, agent sync) writes lines to
//! [`crate::store::TaskLogRepo`] and fans them out live to any number of SSE
//! subscribers via a bounded per-subscriber channel. A subscriber connecting
//! mid-task first replays history from the database, then joins the live
//! feed — no gap, no duplicate (spec §8 S8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};

use crate::error::Result;
use crate::store::{TaskLogRepo, TaskStatusRepo};
use crate::store::models::TaskLogEntry;

/// Grace period after a task reaches a terminal state before its channels
/// are torn down, so a subscriber mid-reconnect still sees the final frames.
const TERMINAL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Per-subscriber channel capacity. A slow subscriber drops frames rather
/// than applying backpressure to the task producing them.
const SUBSCRIBER_CAPACITY: usize = 100;

/// One live log line, wire-shaped per spec §6's SSE event format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogFrame {
    pub id: i64,
    pub level: String,
    pub message: String,
    pub timestamp: i64,
}

impl From<TaskLogEntry> for TaskLogFrame {
    fn from(entry: TaskLogEntry) -> Self {
        Self {
            id: entry.id,
            level: entry.level,
            message: entry.message,
            timestamp: entry.created_at.timestamp(),
        }
    }
}

/// Overall status of a task, broadcast in the initial `{"type":"status",...}`
/// SSE frame for subscribers attaching after the task started (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

struct TaskState {
    status: TaskStatus,
    started_at: i64,
    subscribers: Vec<mpsc::Sender<TaskLogFrame>>,
}

/// Live pub/sub bus over [`TaskLogRepo`]. Shared as one `Arc` across the
/// engine, scheduler, and admin server.
pub struct TaskLogBus {
    repo: TaskLogRepo,
    status_repo: TaskStatusRepo,
    tasks: RwLock<HashMap<String, TaskState>>,
}

impl TaskLogBus {
    pub fn new(repo: TaskLogRepo, status_repo: TaskStatusRepo) -> Arc<Self> {
        Arc::new(Self {
            repo,
            status_repo,
            tasks: RwLock::new(HashMap::new()),
        })
    }

    /// Register a new task as running. Call once at the start of any
    /// operation that will emit task-log lines. Also persists the status so
    /// a subsequent process restart can still report it.
    pub async fn start_task(&self, task_id: &str) {
        self.tasks.write().await.insert(
            task_id.to_string(),
            TaskState {
                status: TaskStatus::Running,
                started_at: Utc::now().timestamp(),
                subscribers: Vec::new(),
            },
        );
        if let Err(e) = self.status_repo.start(task_id).await {
            tracing::warn!(task_id, error = %e, "failed to persist task start");
        }
    }

    /// Append a line to history and fan it out to every live subscriber.
    pub async fn publish(&self, task_id: &str, level: &str, message: &str) -> Result<()> {
        let id = self.repo.append(task_id, level, message).await?;
        let frame = TaskLogFrame {
            id,
            level: level.to_string(),
            message: message.to_string(),
            timestamp: Utc::now().timestamp(),
        };

        let tasks = self.tasks.read().await;
        if let Some(state) = tasks.get(task_id) {
            for sender in &state.subscribers {
                // Best-effort: a full or closed channel just misses this frame.
                let _ = sender.try_send(frame.clone());
            }
        }
        Ok(())
    }

    /// Mark a task finished. Subscriber channels are torn down after a grace
    /// period so a subscriber already mid-flight still receives the final
    /// frames instead of an abrupt close.
    pub fn finish_task(self: &Arc<Self>, task_id: &str, status: TaskStatus) {
        let bus = Arc::clone(self);
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            if let Some(state) = bus.tasks.write().await.get_mut(&task_id) {
                state.status = status;
            }
            if let Err(e) = bus.status_repo.finish(&task_id, status).await {
                tracing::warn!(task_id = %task_id, error = %e, "failed to persist task completion");
            }
            tokio::time::sleep(TERMINAL_GRACE_PERIOD).await;
            bus.tasks.write().await.remove(&task_id);
        });
    }

    /// Current status of a task. Consults the in-memory map first (running
    /// or recently finished, within the grace period), then falls back to
    /// the persisted row so status survives a restart or eviction.
    pub async fn status(&self, task_id: &str) -> Option<(TaskStatus, i64)> {
        if let Some(state) = self.tasks.read().await.get(task_id) {
            return Some((state.status, state.started_at));
        }
        let record = self.status_repo.get(task_id).await.ok().flatten()?;
        Some((record.status, record.started_at.timestamp()))
    }

    /// Subscribe to a task's log: returns the replayed history plus a
    /// receiver for live frames published from this point on.
    pub async fn subscribe(
        &self,
        task_id: &str,
    ) -> Result<(Vec<TaskLogFrame>, mpsc::Receiver<TaskLogFrame>)> {
        let history: Vec<TaskLogFrame> = self
            .repo
            .history(task_id)
            .await?
            .into_iter()
            .map(TaskLogFrame::from)
            .collect();

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut tasks = self.tasks.write().await;
        let state = tasks.entry(task_id.to_string()).or_insert_with(|| TaskState {
            status: TaskStatus::Running,
            started_at: Utc::now().timestamp(),
            subscribers: Vec::new(),
        });
        state.subscribers.push(tx);

        Ok((history, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_bus() -> Arc<TaskLogBus> {
        let store = crate::store::Store::open_in_memory([1u8; 32], b"seed".to_vec())
            .await
            .unwrap();
        TaskLogBus::new(store.task_logs.clone(), store.task_status.clone())
    }

    #[tokio::test]
    async fn test_publish_before_subscribe_replays_as_history() {
        let bus = test_bus().await;
        bus.start_task("task-1").await;
        bus.publish("task-1", "info", "starting").await.unwrap();

        let (history, _rx) = bus.subscribe("task-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "starting");
    }

    #[tokio::test]
    async fn test_subscriber_receives_live_frames() {
        let bus = test_bus().await;
        bus.start_task("task-2").await;
        let (_history, mut rx) = bus.subscribe("task-2").await.unwrap();

        bus.publish("task-2", "info", "live line").await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.message, "live line");
    }

    #[tokio::test]
    async fn test_finish_task_removes_after_grace_period() {
        let bus = test_bus().await;
        bus.start_task("task-3").await;
        bus.finish_task("task-3", TaskStatus::Completed);

        assert_eq!(bus.status("task-3").await.unwrap().0, TaskStatus::Completed);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(bus.status("task-3").await.is_none());
    }
}
