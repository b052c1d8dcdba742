//! Order handlers (create, get, list, cancel)

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use super::super::state::AppState;
use super::super::types::{idem_context, ok, ApiError, ApiResult, AuthUser, CreateOrderWire};
use super::respond;
use crate::models::Order;

/// Submit an order
///
/// POST /api/orders
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderWire,
    responses(
        (status = 200, description = "Order accepted, possibly (partially) filled"),
        (status = 400, description = "Invalid parameters or missing Idempotency-Key"),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Idempotency key reused with a different request"),
        (status = 422, description = "Insufficient funds"),
        (status = 503, description = "No quote for a market order")
    ),
    tag = "Trading"
)]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let idem = idem_context(&headers, &body)?;
    let wire: CreateOrderWire =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let request = wire.parse()?;

    let outcome = state.trading.create_order(user_id, request, &idem).await?;
    respond(outcome)
}

/// Fetch one order
///
/// GET /api/orders/{id}
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order", body = Order),
        (status = 404, description = "Unknown order")
    ),
    tag = "Trading"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Order> {
    let order = state.trading.get_order(order_id).await?;
    ok(order)
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// List the caller's orders, newest first
///
/// GET /api/orders
#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, default 50"),
        ("offset" = Option<i64>, Query, description = "Page offset")
    ),
    responses(
        (status = 200, description = "Orders for the caller"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Trading"
)]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<Vec<Order>> {
    let limit = query.limit.clamp(1, 500);
    let orders = state.trading.list_orders(user_id, limit, query.offset.max(0)).await?;
    ok(orders)
}

/// Cancel a resting order
///
/// DELETE /api/orders/{id}
#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Canceled order", body = Order),
        (status = 400, description = "Order is not open"),
        (status = 404, description = "Unknown order or not the caller's")
    ),
    tag = "Trading"
)]
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Order> {
    let order = state.trading.cancel_order(user_id, order_id).await?;
    ok(order)
}
