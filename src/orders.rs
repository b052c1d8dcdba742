//! Order store - persistent order records
//!
//! Orders are written NEW before matching and updated as fills land. The
//! in-memory book is rebuilt from [`OrderStore::open_by_symbol`] at startup,
//! in ascending created_at order, so price-time priority survives restarts.

use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Order, OrderStatus, Symbol};
use crate::money::Money;

pub struct OrderStore;

impl OrderStore {
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"INSERT INTO orders
                   (id, user_id, symbol, side, order_type, price, qty, filled_qty, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.symbol.as_str())
        .bind(order.side.as_str())
        .bind(order.order_type.as_str())
        .bind(order.price.clone())
        .bind(order.qty.clone())
        .bind(order.filled_qty.clone())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &PgPool, order_id: Uuid) -> Result<Order, EngineError> {
        let row = sqlx::query(
            r#"SELECT id, user_id, symbol, side, order_type, price, qty, filled_qty, status, created_at
               FROM orders WHERE id = $1"#,
        )
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        row_to_order(&row)
    }

    /// Fetch with a row lock; used on the cancellation path.
    pub async fn get_for_update(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> Result<Order, EngineError> {
        let row = sqlx::query(
            r#"SELECT id, user_id, symbol, side, order_type, price, qty, filled_qty, status, created_at
               FROM orders WHERE id = $1 FOR UPDATE"#,
        )
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        row_to_order(&row)
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, EngineError> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, symbol, side, order_type, price, qty, filled_qty, status, created_at
               FROM orders
               WHERE user_id = $1
               ORDER BY created_at DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    /// Open orders for one symbol in original arrival order - the book
    /// recovery input.
    pub async fn open_by_symbol(pool: &PgPool, symbol: Symbol) -> Result<Vec<Order>, EngineError> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, symbol, side, order_type, price, qty, filled_qty, status, created_at
               FROM orders
               WHERE symbol = $1 AND status IN ('NEW', 'PARTIALLY_FILLED')
               ORDER BY created_at ASC"#,
        )
        .bind(symbol.as_str())
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    /// Advance an order's fill state. filled_qty only ever grows; terminal
    /// states are written once.
    pub async fn set_fill_state(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        filled_qty: Money,
        status: OrderStatus,
    ) -> Result<(), EngineError> {
        let result = sqlx::query(
            r#"UPDATE orders SET filled_qty = $1, status = $2 WHERE id = $3"#,
        )
        .bind(filled_qty)
        .bind(status.as_str())
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::OrderNotFound(order_id.to_string()));
        }
        Ok(())
    }
}

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order, EngineError> {
    let symbol_str: String = row.get("symbol");
    let side_str: String = row.get("side");
    let type_str: String = row.get("order_type");
    let status_str: String = row.get("status");

    Ok(Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        symbol: symbol_str
            .parse()
            .map_err(|_| EngineError::Internal(format!("unknown symbol in orders: {}", symbol_str)))?,
        side: side_str
            .parse()
            .map_err(|_| EngineError::Internal(format!("unknown side in orders: {}", side_str)))?,
        order_type: type_str
            .parse()
            .map_err(|_| EngineError::Internal(format!("unknown order type in orders: {}", type_str)))?,
        price: row.get("price"),
        qty: row.get("qty"),
        filled_qty: row.get("filled_qty"),
        status: status_str
            .parse()
            .map_err(|_| EngineError::Internal(format!("unknown status in orders: {}", status_str)))?,
        created_at: row.get("created_at"),
    })
}
