//! Agent authentication middleware (spec §4.7): resolves the agent named by
//! the `{uuid}/{signature}` path prefix and attaches it to the request, or
//! rejects with 401 before any handler runs.

use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{AcmeError, Result};
use crate::server::agent::AgentServerState;

pub async fn agent_auth(
    State(state): State<AgentServerState>,
    Path((uuid, signature)): Path<(String, String)>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let agent = state
        .store
        .agents
        .authenticate(&uuid, &signature)
        .await?
        .ok_or_else(|| AcmeError::unauthorized("unknown agent or signature mismatch"))?;

    req.extensions_mut().insert(agent);
    Ok(next.run(req).await)
}
