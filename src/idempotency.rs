//! Idempotency guard - per-(user, key) request deduplication
//!
//! Mutating endpoints are safe to retry: the stored response is inserted in
//! the same transaction that commits the business effect, so "response
//! stored" and "effect committed" are the same fact. A replay returns the
//! stored bytes; a key reused with a different request fingerprint fails
//! with IDEM_MISMATCH.

use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::IdempotencyRecord;

/// Hash of the request body plus the auth-relevant headers, used to detect
/// key reuse with a different payload. Headers are canonicalised by sorting
/// on the lowercased name so header order never changes the fingerprint.
pub fn fingerprint(body: &[u8], auth_headers: &[(&str, &str)]) -> String {
    let mut headers: Vec<(String, &str)> = auth_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), *value))
        .collect();
    headers.sort();

    let mut hasher = Sha256::new();
    hasher.update(body);
    for (name, value) in &headers {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub struct IdempotencyGuard;

impl IdempotencyGuard {
    /// Look up (user, key) before running the wrapped operation.
    ///
    /// - absent: `Ok(None)`, proceed
    /// - present with matching fingerprint: `Ok(Some(record))`, replay it
    /// - present with a different fingerprint: `Err(IdemMismatch)`
    pub async fn check(
        pool: &PgPool,
        user_id: Uuid,
        key: &str,
        request_fingerprint: &str,
    ) -> Result<Option<IdempotencyRecord>, EngineError> {
        match Self::get(pool, user_id, key).await? {
            None => Ok(None),
            Some(record) => {
                if record.request_fingerprint != request_fingerprint {
                    return Err(EngineError::IdemMismatch);
                }
                Ok(Some(record))
            }
        }
    }

    /// Insert the record inside the business transaction. Returns false when
    /// a concurrent request with the same (user, key) got there first; the
    /// caller rolls back and replays the winner's stored response.
    pub async fn store(
        tx: &mut Transaction<'_, Postgres>,
        record: &IdempotencyRecord,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(
            r#"INSERT INTO idempotency_keys
                   (user_id, idem_key, request_fingerprint, response_code, response_body)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (user_id, idem_key) DO NOTHING"#,
        )
        .bind(record.user_id)
        .bind(&record.idem_key)
        .bind(&record.request_fingerprint)
        .bind(record.response_code)
        .bind(&record.response_body)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(
        pool: &PgPool,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, EngineError> {
        let row = sqlx::query(
            r#"SELECT user_id, idem_key, request_fingerprint, response_code, response_body
               FROM idempotency_keys
               WHERE user_id = $1 AND idem_key = $2"#,
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| IdempotencyRecord {
            user_id: r.get("user_id"),
            idem_key: r.get("idem_key"),
            request_fingerprint: r.get("request_fingerprint"),
            response_code: r.get("response_code"),
            response_body: r.get("response_body"),
        }))
    }
}
