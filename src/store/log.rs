//! `LogRepo` (audit log) and `TaskLogRepo` (task-log bus persistence, spec §4.6).

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{AcmeError, Result};
use crate::store::models::{LogEntry, TaskLogEntry, TaskStatus, TaskStatusRecord};

#[derive(Clone)]
pub struct LogRepo {
    pool: SqlitePool,
}

impl LogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        level: &str,
        module: &str,
        message: &str,
        metadata: Option<&serde_json::Value>,
        operator: Option<&str>,
        direct_ip: Option<&str>,
        forwarded_ip: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO logs (level, module, message, metadata, operator, direct_ip, forwarded_ip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(level)
        .bind(module)
        .bind(message)
        .bind(metadata.map(|m| m.to_string()))
        .bind(operator)
        .bind(direct_ip)
        .bind(forwarded_ip)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query("SELECT * FROM logs ORDER BY id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter()
            .map(|row| {
                let metadata_json: Option<String> =
                    row.try_get("metadata").map_err(AcmeError::Database)?;
                let created_at_str: String =
                    row.try_get("created_at").map_err(AcmeError::Database)?;
                Ok(LogEntry {
                    id: row.try_get("id").map_err(AcmeError::Database)?,
                    level: row.try_get("level").map_err(AcmeError::Database)?,
                    module: row.try_get("module").map_err(AcmeError::Database)?,
                    message: row.try_get("message").map_err(AcmeError::Database)?,
                    metadata: metadata_json
                        .map(|m| serde_json::from_str(&m))
                        .transpose()?,
                    operator: row.try_get("operator").map_err(AcmeError::Database)?,
                    direct_ip: row.try_get("direct_ip").map_err(AcmeError::Database)?,
                    forwarded_ip: row.try_get("forwarded_ip").map_err(AcmeError::Database)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| AcmeError::storage(format!("bad timestamp: {e}")))?,
                })
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct TaskLogRepo {
    pool: SqlitePool,
}

impl TaskLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, task_id: &str, level: &str, message: &str) -> Result<i64> {
        let id = sqlx::query("INSERT INTO task_logs (task_id, level, message) VALUES (?1, ?2, ?3)")
            .bind(task_id)
            .bind(level)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?
            .last_insert_rowid();
        Ok(id)
    }

    /// History replay for a newly-connecting SSE subscriber (spec §4.6, §6).
    pub async fn history(&self, task_id: &str) -> Result<Vec<TaskLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM task_logs WHERE task_id = ?1 ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        rows.into_iter()
            .map(|row| {
                let created_at_str: String =
                    row.try_get("created_at").map_err(AcmeError::Database)?;
                Ok(TaskLogEntry {
                    id: row.try_get("id").map_err(AcmeError::Database)?,
                    task_id: row.try_get("task_id").map_err(AcmeError::Database)?,
                    level: row.try_get("level").map_err(AcmeError::Database)?,
                    message: row.try_get("message").map_err(AcmeError::Database)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| AcmeError::storage(format!("bad timestamp: {e}")))?,
                })
            })
            .collect()
    }

    /// Delete task-log rows older than `older_than`, used by the periodic
    /// cleanup sweep.
    pub async fn cleanup_before(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM task_logs WHERE created_at < ?1")
            .bind(older_than.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        Ok(result.rows_affected())
    }
}

/// Persisted counterpart to [`crate::tasklog::TaskLogBus`]'s in-memory task
/// state, so a task's final status survives process restarts and the bus's
/// terminal grace-period eviction (spec §3 `TaskLogStatus`).
#[derive(Clone)]
pub struct TaskStatusRepo {
    pool: SqlitePool,
}

impl TaskStatusRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a task to `running`, recording its start time.
    pub async fn start(&self, task_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_status (task_id, status, started_at, finished_at)
             VALUES (?1, 'running', strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), NULL)
             ON CONFLICT(task_id) DO UPDATE SET
                status = 'running', started_at = excluded.started_at, finished_at = NULL",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    /// Record a terminal status (`completed` or `failed`).
    pub async fn finish(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        sqlx::query(
            "UPDATE task_status SET status = ?1, finished_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE task_id = ?2",
        )
        .bind(status.as_str())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<TaskStatusRecord>> {
        let row = sqlx::query("SELECT * FROM task_status WHERE task_id = ?1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        let Some(row) = row else { return Ok(None) };

        let status_str: String = row.try_get("status").map_err(AcmeError::Database)?;
        let started_at_str: String = row.try_get("started_at").map_err(AcmeError::Database)?;
        let finished_at_str: Option<String> =
            row.try_get("finished_at").map_err(AcmeError::Database)?;

        Ok(Some(TaskStatusRecord {
            task_id: row.try_get("task_id").map_err(AcmeError::Database)?,
            status: status_str.parse()?,
            started_at: DateTime::parse_from_rfc3339(&started_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| AcmeError::storage(format!("bad timestamp: {e}")))?,
            finished_at: finished_at_str
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| AcmeError::storage(format!("bad timestamp: {e}")))
                })
                .transpose()?,
        }))
    }

    /// Purge terminal task-status rows older than `older_than`, alongside the
    /// task-log cleanup sweep.
    pub async fn cleanup_before(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM task_status WHERE finished_at IS NOT NULL AND finished_at < ?1",
        )
        .bind(older_than.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod task_status_tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(crate::store::schema::SCHEMA)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_task_status_lifecycle() {
        let repo = TaskStatusRepo::new(test_pool().await);
        repo.start("task-x").await.unwrap();
        let record = repo.get("task-x").await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.finished_at.is_none());

        repo.finish("task-x", TaskStatus::Completed).await.unwrap();
        let record = repo.get("task-x").await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.finished_at.is_some());
    }
}
