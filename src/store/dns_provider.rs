//! `DnsProviderRepo`: DNS-01 credential storage. Config JSON is AES-GCM
//! sealed with the `security.encryption_key` setting before it touches disk
//! (spec §3 invariant: plaintext never persisted).

use sqlx::{Row, SqlitePool};

use crate::crypto::aead;
use crate::error::{AcmeError, Result};
use crate::store::models::DnsProvider;

#[derive(Clone)]
pub struct DnsProviderRepo {
    pool: SqlitePool,
    encryption_key: [u8; 32],
}

impl DnsProviderRepo {
    pub fn new(pool: SqlitePool, encryption_key: [u8; 32]) -> Self {
        Self { pool, encryption_key }
    }

    pub async fn create(&self, name: &str, type_tag: &str, config: &serde_json::Value) -> Result<i64> {
        let config_enc = aead::seal_to_string(&self.encryption_key, config.to_string().as_bytes())?;
        let id = sqlx::query(
            "INSERT INTO dns_providers (name, type_tag, config_enc) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(type_tag)
        .bind(config_enc)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<DnsProvider>> {
        let row = sqlx::query("SELECT * FROM dns_providers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        row.map(|r| self.decrypt_row(r)).transpose()
    }

    pub async fn list(&self) -> Result<Vec<DnsProvider>> {
        let rows = sqlx::query("SELECT * FROM dns_providers ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(|r| self.decrypt_row(r)).collect()
    }

    fn decrypt_row(&self, row: sqlx::sqlite::SqliteRow) -> Result<DnsProvider> {
        let config_enc: String = row.try_get("config_enc").map_err(AcmeError::Database)?;
        let plaintext = aead::open_from_string(&self.encryption_key, &config_enc)?;
        let config: serde_json::Value = serde_json::from_slice(&plaintext)?;
        Ok(DnsProvider {
            id: row.try_get("id").map_err(AcmeError::Database)?,
            name: row.try_get("name").map_err(AcmeError::Database)?,
            type_tag: row.try_get("type_tag").map_err(AcmeError::Database)?,
            config,
        })
    }

    /// Delete a provider, refused while any certificate still references it
    /// (spec §3 invariant).
    pub async fn delete(&self, id: i64) -> Result<()> {
        let bound: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM certificates WHERE dns_provider_id = ?1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(AcmeError::Database)?;
        if bound > 0 {
            return Err(AcmeError::invalid_input(
                "cannot delete a DNS provider still referenced by a certificate".to_string(),
            ));
        }
        sqlx::query("DELETE FROM dns_providers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        Ok(())
    }
}
