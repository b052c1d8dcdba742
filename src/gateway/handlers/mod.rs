//! HTTP handlers, grouped the way the API is grouped

pub mod account;
pub mod health;
pub mod market;
pub mod order;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::IdempotencyRecord;
use crate::trading::IdemOutcome;

use super::types::{ApiError, ApiResponse};

/// Turn an idempotency outcome into a response. A replay re-wraps the stored
/// payload bytes verbatim, so retries are byte-identical to the original
/// response.
pub fn respond<T: serde::Serialize>(outcome: IdemOutcome<T>) -> Result<Response, ApiError> {
    match outcome {
        IdemOutcome::Fresh(data) => {
            Ok((StatusCode::OK, Json(ApiResponse::success(data))).into_response())
        }
        IdemOutcome::Replay(record) => replay(record),
    }
}

fn replay(record: IdempotencyRecord) -> Result<Response, ApiError> {
    let body = String::from_utf8(record.response_body)
        .map_err(|_| ApiError::from(crate::error::EngineError::Internal(
            "stored idempotent response is not valid UTF-8".into(),
        )))?;
    let raw = serde_json::value::RawValue::from_string(body).map_err(|e| {
        ApiError::from(crate::error::EngineError::Internal(format!(
            "stored idempotent response is not valid JSON: {}",
            e
        )))
    })?;
    let status = StatusCode::from_u16(record.response_code as u16)
        .unwrap_or(StatusCode::OK);
    Ok((status, Json(ApiResponse::success(raw))).into_response())
}
