//! User store - user rows and account materialisation
//!
//! Authentication lives outside the core; this module only owns the row a
//! user is, and the invariant that a user holds one account per supported
//! currency from the moment it exists.

use sqlx::PgPool;
use uuid::Uuid;

use crate::account::AccountStore;
use crate::error::EngineError;
use crate::models::SYSTEM_USER_ID;

pub struct UserStore;

impl UserStore {
    /// Create a user and materialise its accounts in one transaction.
    /// Called by the auth collaborator on signup.
    pub async fn create(
        pool: &PgPool,
        email: &str,
        password_hash: &str,
    ) -> Result<Uuid, EngineError> {
        let user_id = Uuid::new_v4();
        let mut tx = pool.begin().await?;

        sqlx::query(r#"INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3)"#)
            .bind(user_id)
            .bind(email)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        AccountStore::create_for_user(&mut tx, user_id).await?;

        tx.commit().await?;
        tracing::info!(user_id = %user_id, "user created with accounts in all currencies");
        Ok(user_id)
    }

    /// Materialise the system equity accounts (the top-up counterparty) at
    /// startup. Idempotent.
    pub async fn ensure_system_accounts(pool: &PgPool) -> Result<(), EngineError> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO users (id, email, password_hash)
               VALUES ($1, 'system@paperspot.invalid', '')
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(SYSTEM_USER_ID)
        .execute(&mut *tx)
        .await?;

        AccountStore::create_for_user(&mut tx, SYSTEM_USER_ID).await?;

        tx.commit().await?;
        Ok(())
    }
}
