//! HTTP gateway - thin axum layer over the trading core
//!
//! Transport only: authentication, rate limiting and the quote feed are
//! external collaborators. Handlers parse wire tokens, build idempotency
//! contexts and delegate to [`crate::trading::TradingService`].

pub mod handlers;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::account::fund_topup,
        handlers::account::portfolio,
        handlers::market::quote,
        handlers::order::create_order,
        handlers::order::get_order,
        handlers::order::list_orders,
        handlers::order::cancel_order,
    ),
    components(schemas(
        types::TopUpWire,
        types::CreateOrderWire,
        crate::models::Currency,
        crate::models::Symbol,
        crate::models::Side,
        crate::models::OrderType,
        crate::models::OrderStatus,
        crate::models::Order,
        crate::models::Quote,
        crate::trading::TopUpResponse,
        crate::trading::CreateOrderResponse,
        crate::trading::PortfolioResponse,
        crate::trading::BalanceView,
        crate::trading::PositionView,
        crate::trading::PnlView,
        handlers::health::HealthResponse,
    )),
    tags(
        (name = "Funding", description = "Paper balances"),
        (name = "Trading", description = "Orders and fills"),
        (name = "Market", description = "Quotes"),
        (name = "System", description = "Health")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the full route table
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/fund/topup", post(handlers::account::fund_topup))
        .route("/api/portfolio", get(handlers::account::portfolio))
        .route("/api/quotes", get(handlers::market::quote))
        .route(
            "/api/orders",
            post(handlers::order::create_order).get(handlers::order::list_orders),
        )
        .route(
            "/api/orders/{id}",
            get(handlers::order::get_order).delete(handlers::order::cancel_order),
        )
        .route("/api/docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
