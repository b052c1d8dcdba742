//! Account store - per-(user, currency) balance pairs
//!
//! Every user holds exactly one account per supported currency, materialised
//! at user creation. Balance mutations only happen through
//! [`AccountStore::update_balances`] inside a caller-owned transaction, always
//! alongside the journal entries they correspond to; there is no pathway that
//! writes a balance without one.

use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Account, Currency};
use crate::money::Money;

pub struct AccountStore;

impl AccountStore {
    /// Fetch an account with a row lock (`FOR UPDATE`), serialising
    /// concurrent updates to the same account.
    pub async fn get(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Account, EngineError> {
        let row = sqlx::query(
            r#"SELECT id, user_id, currency, balance_available, balance_hold
               FROM accounts
               WHERE user_id = $1 AND currency = $2
               FOR UPDATE"#,
        )
        .bind(user_id)
        .bind(currency.as_str())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(EngineError::NotFound)?;

        row_to_account(&row)
    }

    /// Fetch an account by id with a row lock.
    pub async fn get_by_id(
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
    ) -> Result<Account, EngineError> {
        let row = sqlx::query(
            r#"SELECT id, user_id, currency, balance_available, balance_hold
               FROM accounts
               WHERE id = $1
               FOR UPDATE"#,
        )
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(EngineError::NotFound)?;

        row_to_account(&row)
    }

    /// Lock every account touched by a fill in one statement, ordered by
    /// ascending account id so concurrent settlements between the same users
    /// cannot deadlock.
    pub async fn lock_for_settlement(
        tx: &mut Transaction<'_, Postgres>,
        pairs: &[(Uuid, Currency)],
    ) -> Result<Vec<Account>, EngineError> {
        let mut conditions = Vec::with_capacity(pairs.len());
        for i in 0..pairs.len() {
            conditions.push(format!(
                "(user_id = ${} AND currency = ${})",
                i * 2 + 1,
                i * 2 + 2
            ));
        }
        let sql = format!(
            r#"SELECT id, user_id, currency, balance_available, balance_hold
               FROM accounts
               WHERE {}
               ORDER BY id ASC
               FOR UPDATE"#,
            conditions.join(" OR ")
        );

        let mut query = sqlx::query(&sql);
        for (user_id, currency) in pairs {
            query = query.bind(*user_id).bind(currency.as_str());
        }

        let rows = query.fetch_all(&mut **tx).await?;
        rows.iter().map(row_to_account).collect()
    }

    /// Write both balances of an account. Must run in the same transaction as
    /// the journal entries (or hold reclassification) that explain the change.
    pub async fn update_balances(
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
        available: Money,
        hold: Money,
    ) -> Result<(), EngineError> {
        let result = sqlx::query(
            r#"UPDATE accounts
               SET balance_available = $1, balance_hold = $2
               WHERE id = $3"#,
        )
        .bind(available)
        .bind(hold)
        .bind(account_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::Internal(format!(
                "balance update touched no rows for account {}",
                account_id
            )));
        }
        Ok(())
    }

    /// Materialise one account per supported currency for a new user.
    pub async fn create_for_user(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<(), EngineError> {
        for currency in Currency::ALL {
            sqlx::query(
                r#"INSERT INTO accounts (id, user_id, currency, balance_available, balance_hold)
                   VALUES ($1, $2, $3, 0, 0)
                   ON CONFLICT (user_id, currency) DO NOTHING"#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(currency.as_str())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Read-only lookup (no lock), for queries outside a mutation path.
    pub async fn find(
        pool: &PgPool,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Option<Account>, EngineError> {
        let row = sqlx::query(
            r#"SELECT id, user_id, currency, balance_available, balance_hold
               FROM accounts
               WHERE user_id = $1 AND currency = $2"#,
        )
        .bind(user_id)
        .bind(currency.as_str())
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// All accounts of a user, ordered by currency (portfolio view).
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Account>, EngineError> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, currency, balance_available, balance_hold
               FROM accounts
               WHERE user_id = $1
               ORDER BY currency"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, EngineError> {
    let currency_str: String = row.get("currency");
    let currency: Currency = currency_str
        .parse()
        .map_err(|_| EngineError::Internal(format!("unknown currency in accounts: {}", currency_str)))?;

    Ok(Account {
        id: row.get("id"),
        user_id: row.get("user_id"),
        currency,
        balance_available: row.get("balance_available"),
        balance_hold: row.get("balance_hold"),
    })
}
