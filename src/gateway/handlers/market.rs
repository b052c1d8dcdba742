//! Market data handlers

use std::sync::Arc;

use axum::extract::{Query, State};
use serde::Deserialize;

use super::super::state::AppState;
use super::super::types::{ok, ApiError, ApiResult};
use crate::error::EngineError;
use crate::models::{Quote, Symbol};

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub symbol: String,
}

/// Best bid/ask for a symbol
///
/// GET /api/quotes?symbol=BTC-USD
#[utoipa::path(
    get,
    path = "/api/quotes",
    params(("symbol" = String, Query, description = "Trading pair, e.g. BTC-USD")),
    responses(
        (status = 200, description = "Current quote", body = Quote),
        (status = 400, description = "Unknown symbol"),
        (status = 503, description = "No quote available")
    ),
    tag = "Market"
)]
pub async fn quote(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuoteQuery>,
) -> ApiResult<Quote> {
    let symbol: Symbol = query
        .symbol
        .parse()
        .map_err(|_| ApiError::from(EngineError::InvalidSymbol(query.symbol.clone())))?;
    let quote = state.trading.quote(symbol).await?;
    ok(quote)
}
