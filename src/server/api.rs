//! Control-plane HTTP surface: the agent control plane (§4.7) nested under
//! `/agent/{uuid}/{signature}`, the task-log SSE bridge (§4.6), and a health
//! endpoint, assembled into one `axum::Router` (spec §0 `letsyncd` binary).

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_stream::Stream;

use super::agent::{self, AgentServerState};
use super::health::{health_handler, HealthCheck};
use crate::error::Result;
use crate::metrics::{MetricsRegistry, SharedMetrics};
use crate::store::Store;
use crate::tasklog::TaskLogBus;

/// Shared state for the non-agent parts of the control-plane server (health,
/// metrics, the task-log SSE bridge).
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub metrics: SharedMetrics,
    pub health: Arc<HealthCheck>,
    pub tasklog: Arc<TaskLogBus>,
}

impl axum::extract::FromRef<AppState> for Arc<HealthCheck> {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}

/// Bind and serve the control-plane HTTP surface at `addr` until the process
/// is stopped.
pub async fn start_server(addr: SocketAddr, store: Store, tasklog: Arc<TaskLogBus>) -> Result<()> {
    let metrics: SharedMetrics = Arc::new(MetricsRegistry::new());
    let health = Arc::new(HealthCheck::new());

    let app_state = AppState {
        store: store.clone(),
        metrics: metrics.clone(),
        health,
        tasklog,
    };
    let agent_state = AgentServerState { store, metrics: metrics.clone() };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/tasks/{task_id}/log", get(task_log_sse))
        .with_state(app_state)
        .nest("/agent/{uuid}/{signature}", agent::router(agent_state));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::AcmeError::transport(format!("failed to bind control plane server: {e}")))?;

    tracing::info!(%addr, "control plane server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| crate::error::AcmeError::transport(format!("server error: {e}")))?;

    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.gather_text()
}

/// Build the preamble-plus-live-frames stream backing [`task_log_sse`],
/// split out so tests can drive it without going through `Sse`/axum's
/// response machinery.
async fn task_log_stream(
    state: AppState,
    task_id: String,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    let (history, mut rx) = state
        .tasklog
        .subscribe(&task_id)
        .await
        .unwrap_or_else(|_| (Vec::new(), tokio::sync::mpsc::channel(1).1));

    let status = state.tasklog.status(&task_id).await;

    stream! {
        yield Ok(Event::default().json_data(serde_json::json!({"type": "connected"})).unwrap());
        if let Some((status, started_at)) = status {
            yield Ok(Event::default()
                .json_data(serde_json::json!({"type": "status", "status": status, "start_time": started_at}))
                .unwrap());
        }
        for frame in history {
            yield Ok(Event::default().json_data(&frame).unwrap());
        }
        while let Some(frame) = rx.recv().await {
            yield Ok(Event::default().json_data(&frame).unwrap());
        }
    }
}

/// SSE bridge over the task-log bus (spec §4.6): history replay first, then
/// live frames, with the `connected`/`status` preamble frames spec §6 names.
async fn task_log_sse(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = task_log_stream(state, task_id).await;
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;
    use crate::store::Store;

    fn test_key() -> [u8; 32] {
        [3u8; 32]
    }

    async fn setup() -> AppState {
        let store = Store::open_in_memory(test_key(), b"agent-secret".to_vec())
            .await
            .unwrap();
        let tasklog = TaskLogBus::new(store.task_logs.clone(), store.task_status.clone());
        AppState {
            store,
            metrics: Arc::new(MetricsRegistry::new()),
            health: Arc::new(HealthCheck::new()),
            tasklog,
        }
    }

    #[tokio::test]
    async fn sse_stream_opens_with_connected_frame_for_unknown_task() {
        let state = setup().await;
        let stream = task_log_stream(state, "no-such-task".to_string()).await;
        let mut stream = Box::pin(stream);
        let first = stream.next().await.unwrap().unwrap();
        assert!(format!("{first:?}").contains("\"type\":\"connected\""));
    }

    #[tokio::test]
    async fn sse_stream_replays_history_then_live_frames() {
        let state = setup().await;
        state.tasklog.start_task("task-1").await;
        state.tasklog.publish("task-1", "info", "starting").await.unwrap();

        let stream = task_log_stream(state.clone(), "task-1".to_string()).await;
        let mut stream = Box::pin(stream);

        let connected = stream.next().await.unwrap().unwrap();
        assert!(format!("{connected:?}").contains("connected"));
        let status_frame = stream.next().await.unwrap().unwrap();
        assert!(format!("{status_frame:?}").contains("\"status\":\"running\""));
        let history_frame = stream.next().await.unwrap().unwrap();
        assert!(format!("{history_frame:?}").contains("starting"));

        state.tasklog.publish("task-1", "info", "live frame").await.unwrap();
        let live_frame = stream.next().await.unwrap().unwrap();
        assert!(format!("{live_frame:?}").contains("live frame"));
    }

    #[tokio::test]
    async fn metrics_handler_reports_prometheus_text_format() {
        let state = setup().await;
        let body = metrics_handler(State(state)).await.into_response();
        let bytes = axum::body::to_bytes(body.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("letsync_agent_heartbeats_total"));
    }
}
