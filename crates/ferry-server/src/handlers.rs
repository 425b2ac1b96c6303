//! API route handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use tracing::debug;

use ferry_fetch::FetchTarget;

use crate::error::{ApiError, Result};
use crate::models::{HealthResponse, ProxyRequest, ProxyResponse};
use crate::state::AppState;

/// POST /api/proxy - Fetch a target through the relay.
///
/// The body is parsed by hand so that a missing or wrong `content-type`
/// still gets a structured answer.
pub async fn proxy(State(state): State<AppState>, body: Bytes) -> Result<Json<ProxyResponse>> {
    let req: ProxyRequest = serde_json::from_slice(&body)?;

    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(ApiError::MissingUrl)?;

    debug!(
        method = req.method.as_deref().unwrap_or("GET"),
        headers = req.headers.len(),
        body_len = req.body.as_ref().map_or(0, String::len),
        "Relay request received"
    );

    let target = FetchTarget::from_parts(url, req.method.as_deref(), &req.headers, req.body)?;
    let result = state.relay.relay(target).await?;

    Ok(Json(ProxyResponse::from(result)))
}

/// GET /api/health - Liveness and version.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}
