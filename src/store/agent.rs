//! `AgentRepo` and `AgentCertRepo`: agent identity, authentication, and
//! certificate-deployment bindings.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::crypto::signer::sign_agent_uuid;
use crate::error::{AcmeError, Result};
use crate::store::models::{Agent, AgentCert, SyncStatus};

#[derive(Clone)]
pub struct AgentRepo {
    pool: SqlitePool,
    agent_secret: Vec<u8>,
}

fn parse_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AcmeError::storage(format!("bad timestamp: {e}")))
    })
    .transpose()
}

fn row_to_agent(row: sqlx::sqlite::SqliteRow) -> Result<Agent> {
    let last_seen: Option<String> = row.try_get("last_seen").map_err(AcmeError::Database)?;
    Ok(Agent {
        id: row.try_get("id").map_err(AcmeError::Database)?,
        uuid: row.try_get("uuid").map_err(AcmeError::Database)?,
        signature: row.try_get("signature").map_err(AcmeError::Database)?,
        name: row.try_get("name").map_err(AcmeError::Database)?,
        poll_interval: row.try_get("poll_interval").map_err(AcmeError::Database)?,
        last_seen: parse_ts(last_seen)?,
        ip: row.try_get("ip").map_err(AcmeError::Database)?,
        version: row.try_get("version").map_err(AcmeError::Database)?,
    })
}

impl AgentRepo {
    /// `agent_secret` is the process-wide `security.agent_secret` setting;
    /// every agent's `signature` is HMAC-SHA256(uuid, agent_secret) (spec §3).
    pub fn new(pool: SqlitePool, agent_secret: Vec<u8>) -> Self {
        Self { pool, agent_secret }
    }

    pub async fn create(&self, name: &str, poll_interval: i64) -> Result<Agent> {
        let uuid = Uuid::new_v4().to_string();
        let signature = sign_agent_uuid(&uuid, &self.agent_secret)?;
        let id = sqlx::query(
            "INSERT INTO agents (uuid, signature, name, poll_interval) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&uuid)
        .bind(&signature)
        .bind(name)
        .bind(poll_interval)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?
        .last_insert_rowid();

        Ok(Agent {
            id,
            uuid,
            signature,
            name: name.to_string(),
            poll_interval,
            last_seen: None,
            ip: None,
            version: None,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        row.map(row_to_agent).transpose()
    }

    /// Look up an agent by its connect-URL `(uuid, signature)` pair,
    /// verifying the signature with a constant-time comparison
    /// (spec §4.7, §8 property 3/4).
    pub async fn authenticate(&self, uuid: &str, signature: &str) -> Result<Option<Agent>> {
        use crate::crypto::signer::verify_agent_signature;
        if !verify_agent_signature(uuid, signature, &self.agent_secret)? {
            return Ok(None);
        }
        let row = sqlx::query("SELECT * FROM agents WHERE uuid = ?1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        let agent = row.map(row_to_agent).transpose()?;
        // Defense in depth: even if the stored signature somehow diverges
        // from a freshly-computed one (e.g. secret rotated without
        // regenerating agents), require an exact match against the row too.
        Ok(agent.filter(|a| a.signature == signature))
    }

    pub async fn list(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(row_to_agent).collect()
    }

    pub async fn touch_heartbeat(&self, id: i64, ip: Option<&str>, version: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE agents SET last_seen = ?1, ip = COALESCE(?2, ip), version = COALESCE(?3, version)
             WHERE id = ?4",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(ip)
        .bind(version)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    /// Rotate both uuid and signature atomically, invalidating the old
    /// connect URL (spec §3 invariant, §8 property 3).
    pub async fn regenerate(&self, id: i64) -> Result<Agent> {
        let new_uuid = Uuid::new_v4().to_string();
        let new_signature = sign_agent_uuid(&new_uuid, &self.agent_secret)?;
        sqlx::query("UPDATE agents SET uuid = ?1, signature = ?2 WHERE id = ?3")
            .bind(&new_uuid)
            .bind(&new_signature)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        self.get_by_id(id)
            .await?
            .ok_or_else(|| AcmeError::not_found(format!("agent {id}")))
    }

    /// Delete an agent; its `agent_certs` rows cascade via the FK (spec §3).
    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM agents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct AgentCertRepo {
    pool: SqlitePool,
}

fn row_to_binding(row: sqlx::sqlite::SqliteRow) -> Result<AgentCert> {
    let last_sync: Option<String> = row.try_get("last_sync").map_err(AcmeError::Database)?;
    let sync_status: String = row.try_get("sync_status").map_err(AcmeError::Database)?;
    let file_mapping_json: String = row.try_get("file_mapping").map_err(AcmeError::Database)?;
    Ok(AgentCert {
        id: row.try_get("id").map_err(AcmeError::Database)?,
        agent_id: row.try_get("agent_id").map_err(AcmeError::Database)?,
        certificate_id: row.try_get("certificate_id").map_err(AcmeError::Database)?,
        deploy_path: row.try_get("deploy_path").map_err(AcmeError::Database)?,
        file_mapping: serde_json::from_str(&file_mapping_json).unwrap_or_default(),
        reload_cmd: row.try_get("reload_cmd").map_err(AcmeError::Database)?,
        last_sync: parse_ts(last_sync)?,
        last_fingerprint: row.try_get("last_fingerprint").map_err(AcmeError::Database)?,
        sync_status: sync_status.parse()?,
    })
}

impl AgentCertRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn bind(
        &self,
        agent_id: i64,
        certificate_id: i64,
        deploy_path: &str,
        file_mapping: &serde_json::Value,
        reload_cmd: Option<&str>,
    ) -> Result<i64> {
        let mapping_json = file_mapping.to_string();
        let id = sqlx::query(
            "INSERT INTO agent_certs (agent_id, certificate_id, deploy_path, file_mapping, reload_cmd)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(agent_id)
        .bind(certificate_id)
        .bind(deploy_path)
        .bind(mapping_json)
        .bind(reload_cmd)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn for_agent(&self, agent_id: i64) -> Result<Vec<AgentCert>> {
        let rows = sqlx::query("SELECT * FROM agent_certs WHERE agent_id = ?1 ORDER BY id")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        rows.into_iter().map(row_to_binding).collect()
    }

    /// Flip every binding for `certificate_id` to `pending` because the
    /// underlying certificate material changed (spec §3 invariant, §8 S6).
    /// Takes an open transaction so callers can commit it together with the
    /// certificate update ([`crate::store::Store::renew_certificate_and_flip_bindings`]
    /// does this inline for exactly that reason).
    pub async fn flip_to_pending_for_certificate(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        certificate_id: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE agent_certs SET sync_status = 'pending' WHERE certificate_id = ?1")
            .bind(certificate_id)
            .execute(&mut **tx)
            .await
            .map_err(AcmeError::Database)?;
        Ok(())
    }

    /// Record that an agent successfully synced a binding to the given
    /// fingerprint (fingerprint-driven no-op on unchanged cert, spec §8 S7).
    pub async fn record_synced(&self, id: i64, fingerprint: &str) -> Result<()> {
        sqlx::query(
            "UPDATE agent_certs SET sync_status = 'synced', last_fingerprint = ?1, last_sync = ?2
             WHERE id = ?3",
        )
        .bind(fingerprint)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AcmeError::Database)?;
        Ok(())
    }

    pub async fn record_failed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE agent_certs SET sync_status = 'failed' WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AcmeError::Database)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::SyncStatus;

    #[test]
    fn test_sync_status_str_round_trip() {
        assert_eq!("pending".parse::<SyncStatus>().unwrap(), SyncStatus::Pending);
        assert_eq!(SyncStatus::Synced.as_str(), "synced");
        assert!("bogus".parse::<SyncStatus>().is_err());
    }
}
