//! Funding and portfolio handlers

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;

use super::super::state::AppState;
use super::super::types::{idem_context, ok, ApiError, ApiResult, AuthUser, TopUpWire};
use super::respond;
use crate::trading::PortfolioResponse;

/// Top up paper USD
///
/// POST /api/fund/topup
#[utoipa::path(
    post,
    path = "/api/fund/topup",
    request_body = TopUpWire,
    responses(
        (status = 200, description = "Balance after credit"),
        (status = 400, description = "Invalid amount or missing Idempotency-Key"),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Idempotency key reused with a different request")
    ),
    tag = "Funding"
)]
pub async fn fund_topup(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let idem = idem_context(&headers, &body)?;
    let wire: TopUpWire =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let amount = wire.amount()?;

    let outcome = state.trading.top_up(user_id, amount, &idem).await?;
    respond(outcome)
}

/// Balances, positions and pnl for the caller
///
/// GET /api/portfolio
#[utoipa::path(
    get,
    path = "/api/portfolio",
    responses(
        (status = 200, description = "Portfolio snapshot", body = PortfolioResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Funding"
)]
pub async fn portfolio(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<PortfolioResponse> {
    let snapshot = state.trading.portfolio(user_id).await?;
    ok(snapshot)
}
