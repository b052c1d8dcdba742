//! Engine error types
//!
//! Every failure surfaced by the core carries one of the stable wire codes.
//! Errors are always the result of a local rollback: by the time a caller
//! sees one, no partial state is observable.

use thiserror::Error;

/// Unified error for the trading core
#[derive(Error, Debug)]
pub enum EngineError {
    // === Validation ===
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid order type: {0}")]
    InvalidOrderType(String),

    // === Authorization (set by the auth collaborator, passed through) ===
    #[error("User not authenticated")]
    Unauthorized,

    // === Funds ===
    #[error("Insufficient funds: available={available}, required={required}")]
    InsufficientFunds { available: String, required: String },

    // === Idempotency ===
    #[error("Idempotency key reused with a different request")]
    IdemMismatch,

    // === Market data ===
    #[error("No quote available for symbol {0}")]
    NoQuote(String),

    // === Lookup ===
    #[error("Not found")]
    NotFound,

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // === Rate limiting (surfaced by the external limiter) ===
    #[error("Rate limit exceeded")]
    RateLimit,

    // === Internal ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::BadRequest(_) => "BAD_REQUEST",
            EngineError::InvalidSymbol(_) => "INVALID_SYMBOL",
            EngineError::InvalidOrderType(_) => "INVALID_ORDER_TYPE",
            EngineError::Unauthorized => "UNAUTHORIZED",
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::IdemMismatch => "IDEM_MISMATCH",
            EngineError::NoQuote(_) => "NO_QUOTE",
            EngineError::NotFound => "NOT_FOUND",
            EngineError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            EngineError::RateLimit => "RATE_LIMIT",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the gateway maps this error to
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::BadRequest(_)
            | EngineError::InvalidSymbol(_)
            | EngineError::InvalidOrderType(_) => 400,
            EngineError::Unauthorized => 401,
            EngineError::NotFound | EngineError::OrderNotFound(_) => 404,
            EngineError::IdemMismatch => 409,
            EngineError::InsufficientFunds { .. } => 422,
            EngineError::NoQuote(_) => 503,
            EngineError::RateLimit => 429,
            EngineError::Internal(_) => 500,
        }
    }

    /// Safe to retry with the same idempotency key?
    ///
    /// Everything except a fingerprint mismatch and outright validation
    /// failures: those will fail identically forever.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            EngineError::IdemMismatch
                | EngineError::BadRequest(_)
                | EngineError::InvalidSymbol(_)
                | EngineError::InvalidOrderType(_)
        )
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => EngineError::NotFound,
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Internal(format!("serialization failed: {}", e))
    }
}

impl From<crate::money::MoneyError> for EngineError {
    fn from(e: crate::money::MoneyError) -> Self {
        EngineError::BadRequest(e.to_string())
    }
}
