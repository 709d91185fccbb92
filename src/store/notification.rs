//! `NotificationChannelRepo`: outbound alert channel configuration. Config is
//! stored as plaintext JSON (spec §3: unlike DNS provider config, not
//! encrypted at rest).

use sqlx::{Row, SqlitePool};

use crate::error::{AcmeError, Result};
use crate::store::models::NotificationChannel;

#[derive(Clone)]
pub struct NotificationChannelRepo {
    pool: SqlitePool,
}

fn row_to_channel(row: sqlx::sqlite::SqliteRow) -> Result<NotificationChannel> {
    let config_json: String = row.try_get("config").map_err(AcmeError::Database)?;
    Ok(NotificationChannel {
        id: row.try_get("id").map_err(AcmeError::Database)?,
        name: row.try_get("name").map_err(AcmeError::Database)?,
        channel_type: row.try_get("channel_type").map_err(AcmeError::Database)?,
        config: serde_json::from_str(&config_json).unwrap_or_default(),
        enabled: row.try_get("enabled").map_err(AcmeError::Database)?,
    })
}

impl NotificationChannelRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        channel_type: &str,
        config: &serde_json::Value,
        enabled: bool,
    ) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO notification_channels (name, channel_type, config, enabled)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(name)
        .bind(channel_type)
        .bind(config.to_string())
        .bind(enabled)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn list_enabled(&self) -> Result<Vec<NotificationChannel>> {
        let rows = sqlx::query("SELECT * FROM notification_channels WHERE enabled = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(row_to_channel).collect()
    }

    pub async fn list(&self) -> Result<Vec<NotificationChannel>> {
        let rows = sqlx::query("SELECT * FROM notification_channels ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(row_to_channel).collect()
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM notification_channels WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        Ok(())
    }
}
