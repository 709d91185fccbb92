//! `SettingRepo`: the `(key, value, type_tag, category, description)` table
//! backing [`crate::settings`]. `security.*` keys hold generated secrets;
//! first boot populates them when empty (spec §3).

use sqlx::{Row, SqlitePool};

use crate::error::{AcmeError, Result};
use crate::store::models::Setting;

#[derive(Clone)]
pub struct SettingRepo {
    pool: SqlitePool,
}

fn row_to_setting(row: sqlx::sqlite::SqliteRow) -> Result<Setting> {
    Ok(Setting {
        key: row.try_get("key").map_err(AcmeError::Database)?,
        value: row.try_get("value").map_err(AcmeError::Database)?,
        type_tag: row.try_get("type_tag").map_err(AcmeError::Database)?,
        category: row.try_get("category").map_err(AcmeError::Database)?,
        description: row.try_get("description").map_err(AcmeError::Database)?,
    })
}

impl SettingRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Setting>> {
        let row = sqlx::query("SELECT * FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        row.map(row_to_setting).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Setting>> {
        let rows = sqlx::query("SELECT * FROM settings ORDER BY category, key")
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(row_to_setting).collect()
    }

    pub async fn list_by_category(&self, category: &str) -> Result<Vec<Setting>> {
        let rows = sqlx::query("SELECT * FROM settings WHERE category = ?1 ORDER BY key")
            .bind(category)
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(row_to_setting).collect()
    }

    /// Insert the row if it does not already exist, leaving any
    /// operator-set value untouched (used to seed defaults at startup).
    pub async fn ensure_default(
        &self,
        key: &str,
        value: &str,
        type_tag: &str,
        category: &str,
        description: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value, type_tag, category, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .bind(type_tag)
        .bind(category)
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("UPDATE settings SET value = ?1 WHERE key = ?2")
            .bind(value)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        Ok(())
    }
}
