//! API response envelope, error mapping and wire request types
//!
//! - `ApiResponse<T>`: unified response wrapper
//! - `ApiResult<T>`: type alias for handler return types
//! - `ApiError`: maps `EngineError` onto the envelope + HTTP status
//! - wire request structs with string-token parsing

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{extract::FromRequestParts, http::request::Parts, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::EngineError;
use crate::idempotency;
use crate::models::{OrderType, Side, Symbol};
use crate::money::Money;
use crate::trading::{CreateOrderRequest, IdemContext};

/// Header the auth collaborator sets after verifying the caller
pub const USER_ID_HEADER: &str = "x-user-id";
/// Required on every mutating endpoint
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// ============================================================================
// Unified API response format
// ============================================================================

/// Unified API response wrapper
///
/// - code: "OK" on success, a stable error code otherwise
/// - msg: short human-readable description
/// - data: payload (success only)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = "OK")]
    pub code: &'static str,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: "OK",
            msg: "ok".to_string(),
            data: Some(data),
        }
    }
}

/// Handler return type: success envelope or error envelope
pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

#[inline]
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

// ============================================================================
// Error mapping
// ============================================================================

/// Error half of the envelope. Everything the core returns funnels through
/// `From<EngineError>` so codes stay in one place.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub msg: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            msg: msg.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self {
            status: StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: e.code(),
            msg: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ApiResponse::<()> {
            code: self.code,
            msg: self.msg,
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Authenticated user
// ============================================================================

/// User identity installed by the external auth middleware. Extraction fails
/// with UNAUTHORIZED when the header is missing or malformed.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(EngineError::Unauthorized)?;
        Ok(AuthUser(user_id))
    }
}

// ============================================================================
// Idempotency plumbing
// ============================================================================

/// Build the idempotency context for a mutating request: the key header is
/// mandatory, the fingerprint covers the body plus auth-relevant headers.
pub fn idem_context(headers: &HeaderMap, body: &[u8]) -> Result<IdemContext, ApiError> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("Idempotency-Key header required"))?;

    let mut auth_headers: Vec<(&str, &str)> = Vec::new();
    for name in ["authorization", USER_ID_HEADER] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            auth_headers.push((name, value));
        }
    }

    Ok(IdemContext {
        key: key.to_string(),
        fingerprint: idempotency::fingerprint(body, &auth_headers),
    })
}

// ============================================================================
// Wire request types
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct TopUpWire {
    /// Decimal string, e.g. "10000.00"
    pub amount: String,
}

impl TopUpWire {
    pub fn amount(&self) -> Result<Money, ApiError> {
        self.amount
            .parse()
            .map_err(|e: crate::money::MoneyError| ApiError::bad_request(e.to_string()))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderWire {
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub price: Option<String>,
    pub qty: String,
}

impl CreateOrderWire {
    /// Token-by-token validation: unknown symbol is INVALID_SYMBOL, unknown
    /// type INVALID_ORDER_TYPE, everything else BAD_REQUEST.
    pub fn parse(&self) -> Result<CreateOrderRequest, ApiError> {
        let symbol: Symbol = self
            .symbol
            .parse()
            .map_err(|_| ApiError::from(EngineError::InvalidSymbol(self.symbol.clone())))?;
        let order_type: OrderType = self
            .order_type
            .parse()
            .map_err(|_| ApiError::from(EngineError::InvalidOrderType(self.order_type.clone())))?;
        let side: Side = self
            .side
            .parse()
            .map_err(|_| ApiError::bad_request(format!("invalid side: {}", self.side)))?;
        let price = self
            .price
            .as_deref()
            .map(|p| p.parse::<Money>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let qty: Money = self
            .qty
            .parse()
            .map_err(|e: crate::money::MoneyError| ApiError::bad_request(e.to_string()))?;

        Ok(CreateOrderRequest {
            symbol,
            side,
            order_type,
            price,
            qty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;

    #[test]
    fn parse_valid_limit_order() {
        let wire = CreateOrderWire {
            symbol: "BTC-USD".into(),
            side: "BUY".into(),
            order_type: "LIMIT".into(),
            price: Some("50000".into()),
            qty: "0.01".into(),
        };
        let req = wire.parse().unwrap();
        assert_eq!(req.symbol, Symbol::BtcUsd);
        assert_eq!(req.order_type, OrderType::Limit);
        assert_eq!(req.price, Some("50000".parse().unwrap()));
    }

    #[test]
    fn parse_unknown_symbol_has_invalid_symbol_code() {
        let wire = CreateOrderWire {
            symbol: "DOGE-USD".into(),
            side: "BUY".into(),
            order_type: "LIMIT".into(),
            price: Some("1".into()),
            qty: "1".into(),
        };
        let err = wire.parse().unwrap_err();
        assert_eq!(err.code, "INVALID_SYMBOL");
    }

    #[test]
    fn parse_unknown_type_has_invalid_order_type_code() {
        let wire = CreateOrderWire {
            symbol: "ETH-USD".into(),
            side: "SELL".into(),
            order_type: "ICEBERG".into(),
            price: None,
            qty: "1".into(),
        };
        let err = wire.parse().unwrap_err();
        assert_eq!(err.code, "INVALID_ORDER_TYPE");
    }

    #[test]
    fn parse_bad_qty_is_bad_request() {
        let wire = CreateOrderWire {
            symbol: "ETH-USD".into(),
            side: "SELL".into(),
            order_type: "MARKET".into(),
            price: None,
            qty: "one".into(),
        };
        let err = wire.parse().unwrap_err();
        assert_eq!(err.code, "BAD_REQUEST");
    }

    #[test]
    fn idem_context_requires_key_header() {
        let headers = HeaderMap::new();
        let err = idem_context(&headers, b"{}").unwrap_err();
        assert_eq!(err.code, "BAD_REQUEST");
    }

    #[test]
    fn idem_context_fingerprints_body_and_user() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, "k1".parse().unwrap());
        headers.insert(USER_ID_HEADER, Uuid::nil().to_string().parse().unwrap());

        let a = idem_context(&headers, b"{\"amount\":\"1\"}").unwrap();
        let b = idem_context(&headers, b"{\"amount\":\"2\"}").unwrap();
        assert_eq!(a.key, "k1");
        assert_ne!(a.fingerprint, b.fingerprint);
    }
}
