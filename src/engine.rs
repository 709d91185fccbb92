//! ACME engine (spec §4.4): the single entry point that turns a
//! [`CertRequest`] into an issued or renewed certificate. One of the three
//! core subsystems — wraps [`crate::client::AcmeClient`] with the workspace
//! (ACME account), DNS provider, and certificate persistence the bare client
//! doesn't know about.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::account::KeyPair;
use crate::certificate::CertificateChain;
use crate::challenge::{ChallengeSolverRegistry, Dns01Solver, Http01Solver};
use crate::client::{AcmeClient, AcmeConfig};
use crate::dns;
use crate::error::{AcmeError, Result};
use crate::store::Store;
use crate::tasklog::TaskLogBus;
use crate::types::{ChallengeType, Contact};

/// Whether a [`CertRequest`] is a first issuance or a renewal of an
/// existing certificate (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Issue,
    Renew,
}

/// The unit of work the engine consumes: what certificate, by which
/// challenge, under which workspace/DNS provider (spec §4.4).
#[derive(Debug, Clone)]
pub struct CertRequest {
    pub domain: String,
    pub san: Vec<String>,
    pub challenge_type: ChallengeType,
    pub dns_provider_id: Option<i64>,
    pub workspace_id: Option<i64>,
    pub cert_id: i64,
    pub task_type: TaskType,
}

/// Binds the store, an HTTP-01 listen address, and the task-log bus into one
/// callable that issues or renews a single certificate end to end.
pub struct AcmeEngine {
    store: Store,
    tasklog: Arc<TaskLogBus>,
    http01_listen_addr: SocketAddr,
}

impl AcmeEngine {
    pub fn new(store: Store, tasklog: Arc<TaskLogBus>, http01_listen_addr: SocketAddr) -> Self {
        Self {
            store,
            tasklog,
            http01_listen_addr,
        }
    }

    /// Run a request to completion, publishing progress to the task-log bus
    /// under `task_id` and recording the outcome in the certificate store.
    /// On failure, records the renewal backoff (spec §4.4, §8 S2) and
    /// propagates the error.
    pub async fn process(&self, task_id: &str, request: CertRequest) -> Result<()> {
        self.tasklog.start_task(task_id).await;
        let outcome = self.run(task_id, &request).await;

        match &outcome {
            Ok(()) => {
                self.tasklog
                    .publish(task_id, "info", "certificate issued")
                    .await?;
                self.tasklog
                    .finish_task(task_id, crate::tasklog::TaskStatus::Completed);
            }
            Err(e) => {
                self.tasklog
                    .publish(task_id, "error", &format!("issuance failed: {e}"))
                    .await?;
                // Issue failures stay `pending` with retry admin-driven only;
                // only a `Renew` failure advances the backoff (spec §4.4).
                if request.task_type == TaskType::Renew {
                    self.store
                        .certificates
                        .record_renew_failure(request.cert_id)
                        .await?;
                }
                self.tasklog
                    .finish_task(task_id, crate::tasklog::TaskStatus::Failed);
            }
        }
        outcome
    }

    async fn run(&self, task_id: &str, request: &CertRequest) -> Result<()> {
        self.tasklog
            .publish(
                task_id,
                "info",
                &format!("{:?} requested for {}", request.task_type, request.domain),
            )
            .await?;

        let (directory_url, contact_email, account_key) = match request.workspace_id {
            Some(id) => {
                let workspace = self
                    .store
                    .workspaces
                    .get(id)
                    .await?
                    .ok_or_else(|| AcmeError::not_found(format!("workspace {id} not found")))?;
                (workspace.directory_url, workspace.email, workspace.account_key_pem)
            }
            None => (
                AcmeConfig::lets_encrypt().directory_url,
                String::new(),
                None,
            ),
        };

        let mut config = AcmeConfig::new(directory_url);
        if !contact_email.is_empty() {
            config = config.with_contact(Contact::email(contact_email)).with_tos_agreed(true);
        }

        let mut client = match &account_key {
            Some(pem) => AcmeClient::with_key_pair(config, KeyPair::from_pem(pem)?),
            None => AcmeClient::new(config)?,
        };

        // Persist a freshly generated account key so future requests against
        // this workspace reuse the same ACME account.
        if account_key.is_none()
            && let Some(workspace_id) = request.workspace_id
        {
            let pem = client.key_pair().serialize_pem();
            self.store
                .workspaces
                .materialize_account_key(workspace_id, &pem, false)
                .await?;
        }

        self.tasklog
            .publish(task_id, "info", "registering ACME account")
            .await?;
        client.register_account().await?;

        let mut registry = ChallengeSolverRegistry::new();
        match request.challenge_type {
            ChallengeType::Dns01 => {
                let provider_id = request.dns_provider_id.ok_or_else(|| {
                    AcmeError::invalid_input("dns-01 challenge requires a dns_provider_id")
                })?;
                let record = self
                    .store
                    .dns_providers
                    .get(provider_id)
                    .await?
                    .ok_or_else(|| AcmeError::not_found(format!("dns provider {provider_id} not found")))?;
                let provider = dns::build_provider(&record.type_tag, &record.config).await?;
                registry.register(Dns01Solver::new(provider, request.domain.clone()));
            }
            ChallengeType::Http01 => {
                registry.register(Http01Solver::new(self.http01_listen_addr));
            }
            ChallengeType::TlsAlpn01 => {
                return Err(AcmeError::challenge(
                    "tls-alpn-01".to_string(),
                    "not supported".to_string(),
                ));
            }
        }

        self.tasklog
            .publish(task_id, "info", "starting ACME order")
            .await?;

        let mut domains = vec![request.domain.clone()];
        domains.extend(request.san.iter().cloned());
        domains.dedup();

        let bundle = client.issue_certificate(domains, &mut registry).await?;

        self.tasklog
            .publish(task_id, "info", "certificate issued, persisting")
            .await?;

        let chain = CertificateChain::from_pem(bundle.certificate_pem.as_bytes())?;
        let (_, leaf) = X509Certificate::from_der(&chain.leaf)
            .map_err(|e| AcmeError::crypto(format!("failed to parse issued certificate: {e}")))?;
        let expires_at = chrono::DateTime::from_timestamp(leaf.validity().not_after.timestamp(), 0)
            .ok_or_else(|| AcmeError::crypto("certificate has an invalid expiry timestamp"))?;
        let fingerprint = crate::crypto::hash::fingerprint_der(&chain.leaf)?;

        let cert_pem = crate::crypto::encoding::PemEncoding::encode(&chain.leaf, "CERTIFICATE");
        let issuer_pem = chain
            .intermediates
            .iter()
            .map(|der| crate::crypto::encoding::PemEncoding::encode(der, "CERTIFICATE"))
            .collect::<String>();

        // Flip agent bindings to `pending` in the same transaction as the
        // cert material write, so a bound agent never observes a renewed
        // certificate without also being told to resync (spec §3, §8 S6).
        self.store
            .renew_certificate_and_flip_bindings(
                request.cert_id,
                cert_pem.as_bytes(),
                bundle.private_key_pem.as_bytes(),
                issuer_pem.as_bytes(),
                bundle.certificate_pem.as_bytes(),
                &fingerprint,
                Utc::now(),
                expires_at,
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TaskType::Issue).unwrap(), "\"issue\"");
        assert_eq!(serde_json::to_string(&TaskType::Renew).unwrap(), "\"renew\"");
    }
}
