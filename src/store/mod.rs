//! Persistence layer: one sqlx SQLite pool composing a repo per entity
//! (spec §3, §4.2). Grounded in the cloudillo project's sqlite meta-adapter:
//! a single embedded, idempotent schema applied at startup, and repos that
//! are cheap `Clone` handles sharing one `SqlitePool`.

pub mod agent;
pub mod certificate;
pub mod dns_provider;
pub mod log;
pub mod models;
pub mod notification;
pub mod schema;
pub mod setting;
pub mod workspace;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::{AcmeError, Result};

pub use agent::{AgentCertRepo, AgentRepo};
pub use certificate::CertificateRepo;
pub use dns_provider::DnsProviderRepo;
pub use log::{LogRepo, TaskLogRepo, TaskStatusRepo};
pub use notification::NotificationChannelRepo;
pub use setting::SettingRepo;
pub use workspace::WorkspaceRepo;

/// The full set of repos the control plane wires up against one database
/// (spec §4.2). Each repo is a cheap handle over the shared pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    pub certificates: CertificateRepo,
    pub dns_providers: DnsProviderRepo,
    pub workspaces: WorkspaceRepo,
    pub agents: AgentRepo,
    pub agent_certs: AgentCertRepo,
    pub notification_channels: NotificationChannelRepo,
    pub task_logs: TaskLogRepo,
    pub task_status: TaskStatusRepo,
    pub settings: SettingRepo,
    pub logs: LogRepo,
}

impl Store {
    /// Open (creating if absent) the SQLite database at `db_path`, apply the
    /// embedded schema, and build every repo. `encryption_key` seals DNS
    /// provider config and workspace account keys; `agent_secret` drives
    /// agent HMAC signatures.
    pub async fn open(
        db_path: impl AsRef<Path>,
        encryption_key: [u8; 32],
        agent_secret: Vec<u8>,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(AcmeError::Database)?;

        sqlx::query(schema::SCHEMA)
            .execute(&pool)
            .await
            .map_err(AcmeError::Database)?;

        Ok(Self {
            certificates: CertificateRepo::new(pool.clone()),
            dns_providers: DnsProviderRepo::new(pool.clone(), encryption_key),
            workspaces: WorkspaceRepo::new(pool.clone(), encryption_key),
            agents: AgentRepo::new(pool.clone(), agent_secret),
            agent_certs: AgentCertRepo::new(pool.clone()),
            notification_channels: NotificationChannelRepo::new(pool.clone()),
            task_logs: TaskLogRepo::new(pool.clone()),
            task_status: TaskStatusRepo::new(pool.clone()),
            settings: SettingRepo::new(pool.clone()),
            logs: LogRepo::new(pool.clone()),
            pool,
        })
    }

    /// In-memory database, for tests.
    pub async fn open_in_memory(encryption_key: [u8; 32], agent_secret: Vec<u8>) -> Result<Self> {
        Self::open(":memory:", encryption_key, agent_secret).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record a successful renewal and flip every agent binding for that
    /// certificate to `pending` in one transaction, so a crash between the
    /// two writes can never leave bindings pointing at stale material
    /// (spec §5 ordering guarantees, §8 property "transactional binding
    /// flip on renewal").
    pub async fn renew_certificate_and_flip_bindings(
        &self,
        cert_id: i64,
        cert_pem: &[u8],
        key_pem: &[u8],
        issuer_pem: &[u8],
        fullchain_pem: &[u8],
        fingerprint: &str,
        issued_at: chrono::DateTime<chrono::Utc>,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AcmeError::Database)?;

        sqlx::query(
            "UPDATE certificates SET
                cert_pem = ?1, key_pem = ?2, issuer_pem = ?3, fullchain_pem = ?4,
                fingerprint = ?5, issued_at = ?6, expires_at = ?7, status = 'valid',
                renew_fail_count = 0, next_retry_at = NULL, last_renew_attempt = ?8
             WHERE id = ?9",
        )
        .bind(cert_pem)
        .bind(key_pem)
        .bind(issuer_pem)
        .bind(fullchain_pem)
        .bind(fingerprint)
        .bind(issued_at.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(cert_id)
        .execute(&mut *tx)
        .await
        .map_err(AcmeError::Database)?;

        sqlx::query("UPDATE agent_certs SET sync_status = 'pending' WHERE certificate_id = ?1")
            .bind(cert_id)
            .execute(&mut *tx)
            .await
            .map_err(AcmeError::Database)?;

        tx.commit().await.map_err(AcmeError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [3u8; 32]
    }

    #[tokio::test]
    async fn test_open_in_memory_applies_schema() {
        let store = Store::open_in_memory(test_key(), b"agent-secret".to_vec())
            .await
            .unwrap();
        assert!(store.certificates.list().await.unwrap().is_empty());
        assert!(store.agents.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_certificate_lifecycle_and_binding_flip() {
        let store = Store::open_in_memory(test_key(), b"agent-secret".to_vec())
            .await
            .unwrap();

        let ws_id = store
            .workspaces
            .create("default", "https://acme.test/directory", "ops@example.com", "EC256", true)
            .await
            .unwrap();
        let cert_id = store
            .certificates
            .create_pending("example.com", &["www.example.com".to_string()], "dns-01", None, Some(ws_id))
            .await
            .unwrap();
        let agent = store.agents.create("edge-1", 300).await.unwrap();
        let binding_id = store
            .agent_certs
            .bind(agent.id, cert_id, "/etc/ssl/letsync", &serde_json::json!({}), None)
            .await
            .unwrap();
        store
            .agent_certs
            .record_synced(binding_id, "sha256:aaaa")
            .await
            .unwrap();

        let now = chrono::Utc::now();
        let expires = now + chrono::Duration::days(90);
        store
            .renew_certificate_and_flip_bindings(
                cert_id,
                b"cert",
                b"key",
                b"issuer",
                b"fullchain",
                "sha256:bbbb",
                now,
                expires,
            )
            .await
            .unwrap();

        let cert = store.certificates.get(cert_id).await.unwrap().unwrap();
        assert_eq!(cert.fingerprint.as_deref(), Some("sha256:bbbb"));
        assert_eq!(cert.status.as_str(), "valid");

        let bindings = store.agent_certs.for_agent(agent.id).await.unwrap();
        assert_eq!(bindings[0].sync_status.as_str(), "pending");
    }

    #[tokio::test]
    async fn test_delete_certificate_refused_while_bound() {
        let store = Store::open_in_memory(test_key(), b"agent-secret".to_vec())
            .await
            .unwrap();
        let cert_id = store
            .certificates
            .create_pending("example.com", &[], "dns-01", None, None)
            .await
            .unwrap();
        let agent = store.agents.create("edge-1", 300).await.unwrap();
        store
            .agent_certs
            .bind(agent.id, cert_id, "/etc/ssl/letsync", &serde_json::json!({}), None)
            .await
            .unwrap();

        assert!(store.certificates.delete(cert_id).await.is_err());
    }

    #[tokio::test]
    async fn test_at_most_one_default_workspace() {
        let store = Store::open_in_memory(test_key(), b"agent-secret".to_vec())
            .await
            .unwrap();
        let a = store
            .workspaces
            .create("a", "https://acme.test/directory", "a@example.com", "EC256", true)
            .await
            .unwrap();
        let b = store
            .workspaces
            .create("b", "https://acme.test/directory", "b@example.com", "EC256", true)
            .await
            .unwrap();

        let defaults: Vec<_> = store
            .workspaces
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|w| w.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, b);

        store.workspaces.set_default(a).await.unwrap();
        let defaults: Vec<_> = store
            .workspaces
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|w| w.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, a);
    }

    #[tokio::test]
    async fn test_agent_regenerate_invalidates_old_signature() {
        use crate::crypto::signer::verify_agent_signature;

        let store = Store::open_in_memory(test_key(), b"agent-secret".to_vec())
            .await
            .unwrap();
        let agent = store.agents.create("edge-1", 300).await.unwrap();
        let old_uuid = agent.uuid.clone();
        let old_signature = agent.signature.clone();

        let regenerated = store.agents.regenerate(agent.id).await.unwrap();
        assert_ne!(regenerated.uuid, old_uuid);
        assert_ne!(regenerated.signature, old_signature);

        assert!(
            store
                .agents
                .authenticate(&old_uuid, &old_signature)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            verify_agent_signature(&regenerated.uuid, &regenerated.signature, b"agent-secret")
                .unwrap()
        );
        assert!(
            store
                .agents
                .authenticate(&regenerated.uuid, &regenerated.signature)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_dns_provider_config_round_trips_encrypted() {
        let store = Store::open_in_memory(test_key(), b"agent-secret".to_vec())
            .await
            .unwrap();
        let config = serde_json::json!({"api_token": "super-secret"});
        let id = store
            .dns_providers
            .create("cf-prod", "cloudflare", &config)
            .await
            .unwrap();
        let fetched = store.dns_providers.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.config, config);

        let raw: String =
            sqlx::query_scalar("SELECT config_enc FROM dns_providers WHERE id = ?1")
                .bind(id)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert!(!raw.contains("super-secret"));
    }
}
