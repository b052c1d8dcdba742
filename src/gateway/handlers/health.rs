//! Health check

use std::sync::Arc;

use axum::extract::State;
use serde::Serialize;
use utoipa::ToSchema;

use super::super::state::AppState;
use super::super::types::{ok, ApiResult};
use crate::error::EngineError;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness + database reachability
///
/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 500, description = "Database unreachable")
    ),
    tag = "System"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    state
        .db
        .health_check()
        .await
        .map_err(|e| EngineError::Internal(e.to_string()))?;
    ok(HealthResponse { status: "ok" })
}
