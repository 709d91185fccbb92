//! Agent control plane (spec §4.7): the five endpoints an agent worker
//! polls, nested under `/agent/{uuid}/{signature}`. Typed `Json<T>`
//! extractors/responses, `AppState` via `FromRef`.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Extension, Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AcmeError, Result};
use crate::metrics::SharedMetrics;
use crate::store::Store;
use crate::store::models::Agent;

#[derive(Clone)]
pub struct AgentServerState {
    pub store: Store,
    pub metrics: SharedMetrics,
}

/// Config response served at `/agent/{uuid}/{signature}/config` (spec §6).
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub agent_id: i64,
    pub name: String,
    pub poll_interval: i64,
    pub certs: Vec<ConfigCertEntry>,
}

#[derive(Debug, Serialize)]
pub struct ConfigCertEntry {
    pub id: i64,
    pub domain: String,
    pub fingerprint: Option<String>,
    pub deploy_path: String,
    pub file_mapping: serde_json::Value,
    pub reload_cmd: Option<String>,
}

/// Lightweight listing served at `/agent/{uuid}/{signature}/certs`.
#[derive(Debug, Serialize)]
pub struct CertSummary {
    pub id: i64,
    pub domain: String,
    pub fingerprint: Option<String>,
}

/// Cert material served at `/agent/{uuid}/{signature}/cert/{id}`.
#[derive(Debug, Serialize)]
pub struct CertMaterial {
    pub cert_pem: String,
    pub key_pem: String,
    pub fullchain_pem: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub syncs: Vec<SyncReport>,
}

#[derive(Debug, Deserialize)]
pub struct SyncReport {
    pub cert_id: i64,
    #[serde(default)]
    pub fingerprint: Option<String>,
    pub status: String,
}

async fn load_certs_for_agent(state: &AgentServerState, agent_id: i64) -> Result<Vec<ConfigCertEntry>> {
    let bindings = state.store.agent_certs.for_agent(agent_id).await?;
    let mut entries = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let cert = state
            .store
            .certificates
            .get(binding.certificate_id)
            .await?
            .ok_or_else(|| AcmeError::not_found(format!("certificate {} not found", binding.certificate_id)))?;
        entries.push(ConfigCertEntry {
            id: cert.id,
            domain: cert.domain,
            fingerprint: cert.fingerprint,
            deploy_path: binding.deploy_path,
            file_mapping: binding.file_mapping,
            reload_cmd: binding.reload_cmd,
        });
    }
    Ok(entries)
}

pub async fn get_config(
    State(state): State<AgentServerState>,
    Extension(agent): Extension<Agent>,
) -> Result<impl IntoResponse> {
    let certs = load_certs_for_agent(&state, agent.id).await?;
    Ok(Json(ConfigResponse {
        agent_id: agent.id,
        name: agent.name,
        poll_interval: agent.poll_interval,
        certs,
    }))
}

pub async fn list_certs(
    State(state): State<AgentServerState>,
    Extension(agent): Extension<Agent>,
) -> Result<impl IntoResponse> {
    let bindings = state.store.agent_certs.for_agent(agent.id).await?;
    let mut summaries = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let cert = state
            .store
            .certificates
            .get(binding.certificate_id)
            .await?
            .ok_or_else(|| AcmeError::not_found(format!("certificate {} not found", binding.certificate_id)))?;
        summaries.push(CertSummary {
            id: cert.id,
            domain: cert.domain,
            fingerprint: cert.fingerprint,
        });
    }
    Ok(Json(summaries))
}

pub async fn get_cert(
    State(state): State<AgentServerState>,
    Extension(agent): Extension<Agent>,
    Path(cert_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let bindings = state.store.agent_certs.for_agent(agent.id).await?;
    if !bindings.iter().any(|b| b.certificate_id == cert_id) {
        return Err(AcmeError::forbidden(format!(
            "agent {} has no binding for certificate {cert_id}",
            agent.id
        )));
    }

    let cert = state
        .store
        .certificates
        .get(cert_id)
        .await?
        .ok_or_else(|| AcmeError::not_found(format!("certificate {cert_id} not found")))?;

    let to_string = |bytes: Option<Vec<u8>>| -> Result<String> {
        bytes
            .map(|b| String::from_utf8(b).map_err(|e| AcmeError::storage(format!("non-utf8 pem: {e}"))))
            .transpose()
            .map(|s| s.unwrap_or_default())
    };

    Ok(Json(CertMaterial {
        cert_pem: to_string(cert.cert_pem)?,
        key_pem: to_string(cert.key_pem)?,
        fullchain_pem: to_string(cert.fullchain_pem)?,
    }))
}

pub async fn heartbeat(
    State(state): State<AgentServerState>,
    Extension(agent): Extension<Agent>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(body): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse> {
    let ip = body.ip.filter(|ip| !ip.is_empty()).unwrap_or_else(|| remote.ip().to_string());
    state
        .store
        .agents
        .touch_heartbeat(agent.id, Some(&ip), body.version.as_deref())
        .await?;
    state.metrics.agent_heartbeats_total.inc();
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn report_status(
    State(state): State<AgentServerState>,
    Extension(agent): Extension<Agent>,
    Json(body): Json<StatusRequest>,
) -> Result<impl IntoResponse> {
    let bindings = state.store.agent_certs.for_agent(agent.id).await?;
    for sync in body.syncs {
        let Some(binding) = bindings.iter().find(|b| b.certificate_id == sync.cert_id) else {
            continue;
        };
        match sync.status.as_str() {
            "synced" => {
                let fingerprint = sync.fingerprint.unwrap_or_default();
                state.store.agent_certs.record_synced(binding.id, &fingerprint).await?;
            }
            "failed" => {
                state.store.agent_certs.record_failed(binding.id).await?;
            }
            _ => {}
        }
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Build the nested `/agent/{uuid}/{signature}/*` router, protected by
/// [`agent_auth`].
pub fn router(state: AgentServerState) -> Router<()> {
    Router::new()
        .route("/config", get(get_config))
        .route("/certs", get(list_certs))
        .route("/cert/{id}", get(get_cert))
        .route("/heartbeat", post(heartbeat))
        .route("/status", post(report_status))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), crate::server::auth::agent_auth))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::Extension;

    use super::*;
    use crate::metrics::MetricsRegistry;
    use crate::store::Store;

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    async fn setup() -> (AgentServerState, Agent) {
        let store = Store::open_in_memory(test_key(), b"agent-secret".to_vec())
            .await
            .unwrap();
        let agent = store.agents.create("edge-1", 60).await.unwrap();
        let state = AgentServerState {
            store,
            metrics: Arc::new(MetricsRegistry::new()),
        };
        (state, agent)
    }

    #[tokio::test]
    async fn get_config_returns_bound_certs_with_deploy_metadata() {
        let (state, agent) = setup().await;
        let cert_id = state
            .store
            .certificates
            .create_pending("example.com", &[], "http-01", None, None)
            .await
            .unwrap();
        state
            .store
            .agent_certs
            .bind(agent.id, cert_id, "/etc/ssl/example", &serde_json::json!({}), None)
            .await
            .unwrap();

        let config = load_certs_for_agent(&state, agent.id).await.unwrap();
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].domain, "example.com");
        assert_eq!(config[0].deploy_path, "/etc/ssl/example");

        assert!(get_config(State(state), Extension(agent)).await.is_ok());
    }

    #[tokio::test]
    async fn get_cert_rejects_unbound_certificate() {
        let (state, agent) = setup().await;
        let cert_id = state
            .store
            .certificates
            .create_pending("unbound.example.com", &[], "http-01", None, None)
            .await
            .unwrap();

        let err = get_cert(State(state), Extension(agent), Path(cert_id))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn get_cert_returns_material_for_bound_certificate() {
        let (state, agent) = setup().await;
        let cert_id = state
            .store
            .certificates
            .create_pending("bound.example.com", &[], "http-01", None, None)
            .await
            .unwrap();
        state
            .store
            .agent_certs
            .bind(agent.id, cert_id, "/etc/ssl/bound", &serde_json::json!({}), None)
            .await
            .unwrap();
        state
            .store
            .certificates
            .record_issued(
                cert_id,
                b"cert-pem",
                b"key-pem",
                b"issuer-pem",
                b"fullchain-pem",
                "sha256:deadbeef",
                chrono::Utc::now(),
                chrono::Utc::now() + chrono::Duration::days(90),
            )
            .await
            .unwrap();

        let resp = get_cert(State(state), Extension(agent), Path(cert_id)).await;
        assert!(resp.is_ok());
    }

    #[tokio::test]
    async fn list_certs_returns_summary_for_each_binding() {
        let (state, agent) = setup().await;
        let cert_id = state
            .store
            .certificates
            .create_pending("list.example.com", &[], "http-01", None, None)
            .await
            .unwrap();
        state
            .store
            .agent_certs
            .bind(agent.id, cert_id, "/etc/ssl/list", &serde_json::json!({}), None)
            .await
            .unwrap();

        let resp = list_certs(State(state), Extension(agent)).await;
        assert!(resp.is_ok());
    }

    #[tokio::test]
    async fn heartbeat_records_ip_and_version_and_increments_metric() {
        let (state, agent) = setup().await;
        let body = HeartbeatRequest {
            version: Some("1.2.3".to_string()),
            ip: Some("10.0.0.5".to_string()),
        };
        let remote: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        heartbeat(State(state.clone()), Extension(agent.clone()), ConnectInfo(remote), Json(body))
            .await
            .unwrap();

        assert_eq!(state.metrics.agent_heartbeats_total.get(), 1);
    }

    #[tokio::test]
    async fn heartbeat_falls_back_to_remote_addr_when_ip_omitted() {
        let (state, agent) = setup().await;
        let body = HeartbeatRequest { version: None, ip: None };
        let remote: SocketAddr = "203.0.113.7:4433".parse().unwrap();

        assert!(heartbeat(State(state), Extension(agent), ConnectInfo(remote), Json(body))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn report_status_updates_binding_for_reported_certificate() {
        let (state, agent) = setup().await;
        let cert_id = state
            .store
            .certificates
            .create_pending("status.example.com", &[], "http-01", None, None)
            .await
            .unwrap();
        let binding_id = state
            .store
            .agent_certs
            .bind(agent.id, cert_id, "/etc/ssl/status", &serde_json::json!({}), None)
            .await
            .unwrap();

        let body = StatusRequest {
            syncs: vec![SyncReport {
                cert_id,
                fingerprint: Some("sha256:abc123".to_string()),
                status: "synced".to_string(),
            }],
        };
        report_status(State(state.clone()), Extension(agent.clone()), Json(body))
            .await
            .unwrap();

        let bindings = state.store.agent_certs.for_agent(agent.id).await.unwrap();
        let binding = bindings.iter().find(|b| b.id == binding_id).unwrap();
        assert_eq!(binding.sync_status, crate::store::models::SyncStatus::Synced);
        assert_eq!(binding.last_fingerprint.as_deref(), Some("sha256:abc123"));
    }
}
