//! Agent worker: the poll loop a deployed `letsync` binary runs against one
//! control-plane connect URL (spec §4.8). Single-threaded, one cycle at a
//! time, using `reqwest` for the HTTP client and `crypto::hash` for local
//! fingerprinting.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::crypto::encoding::PemEncoding;
use crate::crypto::hash::fingerprint_der;
use crate::deploy::{self, DeployFiles};
use crate::error::{AcmeError, Result};
use crate::reload;

/// Constant backoff after a failed `/config` poll (spec §4.8 step 1).
const CONFIG_RETRY_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct AgentConfig {
    #[allow(dead_code)]
    agent_id: i64,
    #[allow(dead_code)]
    name: String,
    poll_interval: i64,
    certs: Vec<AgentCertEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct AgentCertEntry {
    id: i64,
    domain: String,
    fingerprint: Option<String>,
    deploy_path: String,
    file_mapping: serde_json::Value,
    reload_cmd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CertMaterial {
    cert_pem: String,
    key_pem: String,
    fullchain_pem: String,
}

#[derive(Debug, Serialize)]
struct HeartbeatBody {
    version: String,
    ip: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    syncs: Vec<SyncOutcome>,
}

#[derive(Debug, Clone, Serialize)]
struct SyncOutcome {
    cert_id: i64,
    fingerprint: Option<String>,
    status: &'static str,
}

/// Reads a `file_mapping` string field, surfacing a deploy error if absent
/// rather than silently skipping a file (spec §4.9: every filename is
/// validated before use).
fn mapping_field<'a>(mapping: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    mapping
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AcmeError::deploy(format!("file_mapping missing '{key}' entry")))
}

/// SHA-256 fingerprint of the DER contents of an on-disk PEM cert file, in
/// the same `"sha256:..."` shape the control plane reports (spec §4.8 step
/// 2). Returns `None` if the file is absent or unreadable, which the
/// caller treats the same as "fingerprint differs" and redeploys.
async fn local_fingerprint(path: &std::path::Path) -> Option<String> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    let (_, der) = PemEncoding::decode(&contents).ok()?;
    fingerprint_der(&der).ok()
}

/// One agent worker instance, bound to a single control-plane connect URL.
pub struct AgentWorker {
    client: Client,
    connect_url: String,
    allow_list: Vec<String>,
    version: String,
}

impl AgentWorker {
    pub fn new(connect_url: String, allow_list: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            connect_url: connect_url.trim_end_matches('/').to_string(),
            allow_list,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.connect_url)
    }

    /// Run the poll loop. `once` exits after a single cycle (spec §4.8).
    pub async fn run(&self, once: bool) -> Result<()> {
        loop {
            let config = match self.fetch_config().await {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "failed to fetch agent config, retrying");
                    tokio::time::sleep(CONFIG_RETRY_BACKOFF).await;
                    continue;
                }
            };

            let mut outcomes = Vec::with_capacity(config.certs.len());
            for entry in &config.certs {
                outcomes.push(self.sync_one(entry).await);
            }

            if let Err(e) = self.report_status(&outcomes).await {
                tracing::warn!(error = %e, "failed to report sync status");
            }
            if let Err(e) = self.heartbeat().await {
                tracing::warn!(error = %e, "failed to send heartbeat");
            }

            if once {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(config.poll_interval.max(1) as u64)).await;
        }
    }

    async fn fetch_config(&self) -> Result<AgentConfig> {
        let resp = self
            .client
            .get(self.url("config"))
            .send()
            .await
            .map_err(|e| AcmeError::transport(format!("GET /config failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AcmeError::transport(format!("GET /config returned {}", resp.status())));
        }
        resp.json()
            .await
            .map_err(|e| AcmeError::transport(format!("malformed /config response: {e}")))
    }

    async fn fetch_cert(&self, cert_id: i64) -> Result<CertMaterial> {
        let resp = self
            .client
            .get(self.url(&format!("cert/{cert_id}")))
            .send()
            .await
            .map_err(|e| AcmeError::transport(format!("GET /cert/{cert_id} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AcmeError::transport(format!(
                "GET /cert/{cert_id} returned {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AcmeError::transport(format!("malformed /cert/{cert_id} response: {e}")))
    }

    async fn heartbeat(&self) -> Result<()> {
        let body = HeartbeatBody {
            version: self.version.clone(),
            ip: None,
        };
        self.client
            .post(self.url("heartbeat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AcmeError::transport(format!("POST /heartbeat failed: {e}")))?;
        Ok(())
    }

    async fn report_status(&self, outcomes: &[SyncOutcome]) -> Result<()> {
        let body = StatusBody {
            syncs: outcomes.to_vec(),
        };
        self.client
            .post(self.url("status"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AcmeError::transport(format!("POST /status failed: {e}")))?;
        Ok(())
    }

    /// Deploy one bound certificate if its fingerprint changed, returning
    /// the outcome to report back (spec §4.8 step 2-3).
    async fn sync_one(&self, entry: &AgentCertEntry) -> SyncOutcome {
        match self.sync_one_inner(entry).await {
            Ok(fingerprint) => SyncOutcome {
                cert_id: entry.id,
                fingerprint: Some(fingerprint),
                status: "synced",
            },
            Err(e) => {
                tracing::error!(domain = %entry.domain, error = %e, "failed to sync certificate");
                SyncOutcome {
                    cert_id: entry.id,
                    fingerprint: None,
                    status: "failed",
                }
            }
        }
    }

    async fn sync_one_inner(&self, entry: &AgentCertEntry) -> Result<String> {
        let cert_name = mapping_field(&entry.file_mapping, "cert")?;
        let key_name = mapping_field(&entry.file_mapping, "key")?;
        let fullchain_name = mapping_field(&entry.file_mapping, "fullchain")?;

        let local_path = std::path::Path::new(&entry.deploy_path).join(cert_name);
        let current = local_fingerprint(&local_path).await;

        if current.is_some() && current == entry.fingerprint {
            return Ok(current.unwrap());
        }

        let material = self.fetch_cert(entry.id).await?;
        deploy::write_deploy_files(
            &entry.deploy_path,
            DeployFiles {
                cert_name,
                key_name,
                fullchain_name,
                cert_pem: material.cert_pem.as_bytes(),
                key_pem: material.key_pem.as_bytes(),
                fullchain_pem: material.fullchain_pem.as_bytes(),
            },
            &self.allow_list,
        )
        .await?;

        if let Some(cmd) = &entry.reload_cmd {
            reload::run_reload_command(cmd).await?;
        }

        let (_, der) = PemEncoding::decode(&material.cert_pem)?;
        fingerprint_der(&der)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_field_reports_missing_key() {
        let mapping = serde_json::json!({"cert": "example.crt"});
        assert!(mapping_field(&mapping, "cert").is_ok());
        assert!(mapping_field(&mapping, "key").is_err());
    }

    #[tokio::test]
    async fn local_fingerprint_is_none_for_missing_file() {
        let path = std::path::Path::new("/nonexistent/path/cert.pem");
        assert!(local_fingerprint(path).await.is_none());
    }

    #[tokio::test]
    async fn local_fingerprint_matches_server_computation_for_same_der() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("example.crt");
        let pem = "-----BEGIN CERTIFICATE-----\n\
            ZmFrZS1kZXItYnl0ZXM=\n\
            -----END CERTIFICATE-----\n";
        tokio::fs::write(&cert_path, pem).await.unwrap();

        let expected = fingerprint_der(b"fake-der-bytes").unwrap();
        assert_eq!(local_fingerprint(&cert_path).await, Some(expected));
    }

    #[test]
    fn worker_url_strips_trailing_slash_from_connect_url() {
        let worker = AgentWorker::new("https://host/agent/u/s/".to_string(), vec![]);
        assert_eq!(worker.url("config"), "https://host/agent/u/s/config");
    }
}
