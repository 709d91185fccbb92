//! Entity types persisted by the store. These mirror the data model the
//! control plane exposes over the agent and admin APIs; wire-shape structs
//! in `server::*` derive from or convert to these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Certificate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Pending,
    Valid,
    Expired,
    Error,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Valid => "valid",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for CertificateStatus {
    type Err = crate::error::AcmeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CertificateStatus::Pending),
            "valid" => Ok(CertificateStatus::Valid),
            "expired" => Ok(CertificateStatus::Expired),
            "error" => Ok(CertificateStatus::Error),
            other => Err(crate::error::AcmeError::storage(format!(
                "unknown certificate status: {other}"
            ))),
        }
    }
}

/// A managed TLS certificate (spec §3 `Certificate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub domain: String,
    /// Subject alternative names, in the order they were requested.
    pub san: Vec<String>,
    pub challenge_type: String,
    pub dns_provider_id: Option<i64>,
    pub workspace_id: Option<i64>,
    pub cert_pem: Option<Vec<u8>>,
    pub key_pem: Option<Vec<u8>>,
    pub issuer_pem: Option<Vec<u8>>,
    pub fullchain_pem: Option<Vec<u8>>,
    pub fingerprint: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: CertificateStatus,
    pub renew_fail_count: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_renew_attempt: Option<DateTime<Utc>>,
}

/// A DNS-01 provider credential (spec §3 `DNS provider`). `config` is the
/// *decrypted* JSON blob; at rest it is AES-GCM sealed via [`crate::crypto::aead`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsProvider {
    pub id: i64,
    pub name: String,
    pub type_tag: String,
    pub config: serde_json::Value,
}

/// An ACME account + default issuance policy (spec §3 `Workspace`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub directory_url: String,
    pub email: String,
    pub key_type: String,
    pub is_default: bool,
    /// Decrypted PEM of the ACME account key, once materialized.
    pub account_key_pem: Option<String>,
}

/// Derived online/offline status of an [`Agent`], computed from `last_seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Online,
    Offline,
}

/// A deployment target polling for certificates (spec §3 `Agent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub uuid: String,
    pub signature: String,
    pub name: String,
    pub poll_interval: i64,
    pub last_seen: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub version: Option<String>,
}

impl Agent {
    /// Derive [`AgentStatus`] from `last_seen` relative to `now` (spec §3:
    /// offline once more than 2x the poll interval has elapsed).
    pub fn status(&self, now: DateTime<Utc>) -> AgentStatus {
        match self.last_seen {
            None => AgentStatus::Pending,
            Some(last_seen) => {
                let stale_after = chrono::Duration::seconds(self.poll_interval.max(1) * 2);
                if now - last_seen > stale_after {
                    AgentStatus::Offline
                } else {
                    AgentStatus::Online
                }
            }
        }
    }

    /// The connect URL an operator hands to the agent binary
    /// (`<scheme>://<host>:<port>/agent/<uuid>/<signature>`, spec §6).
    pub fn connect_url(&self, base: &str) -> String {
        format!("{}/agent/{}/{}", base.trim_end_matches('/'), self.uuid, self.signature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = crate::error::AcmeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(crate::error::AcmeError::storage(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

/// Binding of a certificate to an agent deployment path (spec §3 `AgentCert`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCert {
    pub id: i64,
    pub agent_id: i64,
    pub certificate_id: i64,
    pub deploy_path: String,
    pub file_mapping: serde_json::Value,
    pub reload_cmd: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_fingerprint: Option<String>,
    pub sync_status: SyncStatus,
}

/// An outbound alert channel (spec §3 `Notification channel`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: i64,
    pub name: String,
    pub channel_type: String,
    pub config: serde_json::Value,
    pub enabled: bool,
}

/// A runtime setting row (spec §3 `Setting`). `security.*` keys hold
/// generated secrets; see [`crate::settings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub type_tag: String,
    pub category: String,
    pub description: Option<String>,
}

/// An audit/log entry (spec §3 `Log`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub level: String,
    pub module: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub operator: Option<String>,
    pub direct_ip: Option<String>,
    pub forwarded_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted task-log entry (spec §4.6); the live pub/sub bus in
/// [`crate::tasklog`] replays history from this table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub id: i64,
    pub task_id: String,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Overall status of a task tracked across its [`TaskLogEntry`] rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::error::AcmeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(crate::error::AcmeError::storage(format!(
                "unknown task status: {other}"
            ))),
        }
    }
}

/// A persisted task status row, surviving process restarts and the
/// in-memory bus's terminal grace period (spec §3 `TaskLogStatus`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
