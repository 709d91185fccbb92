//! `WorkspaceRepo`: ACME account + default issuance policy storage.

use sqlx::{Row, SqlitePool};

use crate::crypto::aead;
use crate::error::{AcmeError, Result};
use crate::store::models::Workspace;

#[derive(Clone)]
pub struct WorkspaceRepo {
    pool: SqlitePool,
    encryption_key: [u8; 32],
}

impl WorkspaceRepo {
    pub fn new(pool: SqlitePool, encryption_key: [u8; 32]) -> Self {
        Self { pool, encryption_key }
    }

    /// Create a workspace. If `is_default` is true, clears the flag on every
    /// other workspace first so at most one stays default (spec §3 invariant).
    pub async fn create(
        &self,
        name: &str,
        directory_url: &str,
        email: &str,
        key_type: &str,
        is_default: bool,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(AcmeError::Database)?;
        if is_default {
            sqlx::query("UPDATE workspaces SET is_default = 0")
                .execute(&mut *tx)
                .await
                .map_err(AcmeError::Database)?;
        }
        let id = sqlx::query(
            "INSERT INTO workspaces (name, directory_url, email, key_type, is_default)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(name)
        .bind(directory_url)
        .bind(email)
        .bind(key_type)
        .bind(is_default)
        .execute(&mut *tx)
        .await
        .map_err(AcmeError::Database)?
        .last_insert_rowid();
        tx.commit().await.map_err(AcmeError::Database)?;
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Workspace>> {
        let row = sqlx::query("SELECT * FROM workspaces WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        row.map(|r| self.row_to_workspace(r)).transpose()
    }

    pub async fn get_default(&self) -> Result<Option<Workspace>> {
        let row = sqlx::query("SELECT * FROM workspaces WHERE is_default = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        row.map(|r| self.row_to_workspace(r)).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Workspace>> {
        let rows = sqlx::query("SELECT * FROM workspaces ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(|r| self.row_to_workspace(r)).collect()
    }

    fn row_to_workspace(&self, row: sqlx::sqlite::SqliteRow) -> Result<Workspace> {
        let account_key_enc: Option<String> =
            row.try_get("account_key_enc").map_err(AcmeError::Database)?;
        let account_key_pem = account_key_enc
            .map(|enc| {
                let plaintext = aead::open_from_string(&self.encryption_key, &enc)?;
                String::from_utf8(plaintext)
                    .map_err(|e| AcmeError::crypto(format!("invalid account key utf8: {e}")))
            })
            .transpose()?;
        Ok(Workspace {
            id: row.try_get("id").map_err(AcmeError::Database)?,
            name: row.try_get("name").map_err(AcmeError::Database)?,
            directory_url: row.try_get("directory_url").map_err(AcmeError::Database)?,
            email: row.try_get("email").map_err(AcmeError::Database)?,
            key_type: row.try_get("key_type").map_err(AcmeError::Database)?,
            is_default: row.try_get("is_default").map_err(AcmeError::Database)?,
            account_key_pem,
        })
    }

    /// Materialize the ACME account private key on first use. Spec §3: once
    /// written, only rewritten via an explicit reset (`force`).
    pub async fn materialize_account_key(&self, id: i64, pem: &str, force: bool) -> Result<()> {
        if !force {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT account_key_enc FROM workspaces WHERE id = ?1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(AcmeError::Database)?;
            if existing.is_some() {
                return Err(AcmeError::invalid_input(
                    "workspace already has an account key; use an explicit reset".to_string(),
                ));
            }
        }
        let enc = aead::seal_to_string(&self.encryption_key, pem.as_bytes())?;
        sqlx::query("UPDATE workspaces SET account_key_enc = ?1 WHERE id = ?2")
            .bind(enc)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        Ok(())
    }

    /// Make `id` the default workspace, clearing the flag everywhere else.
    pub async fn set_default(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AcmeError::Database)?;
        sqlx::query("UPDATE workspaces SET is_default = 0")
            .execute(&mut *tx)
            .await
            .map_err(AcmeError::Database)?;
        sqlx::query("UPDATE workspaces SET is_default = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AcmeError::Database)?;
        tx.commit().await.map_err(AcmeError::Database)?;
        Ok(())
    }
}
