//! Trading service - order lifecycle orchestration
//!
//! `create_order` turns a validated request into journaled fills:
//! validate -> price (market) -> hold -> order row -> match -> settle ->
//! statuses -> idempotency record -> commit -> apply to book.
//!
//! Everything between the hold and the idempotency record runs in one
//! transaction; a failure anywhere rolls the whole submit back and leaves
//! the system indistinguishable from the order never having been submitted.
//!
//! Concurrency: one `tokio::sync::Mutex<OrderBook>` per symbol, acquired
//! before the transaction begins and held through commit and book apply.
//! The book is a single-writer projection of committed state: it is only
//! mutated after a successful commit, so rollbacks never need an undo path.
//! Taking the lock before any row lock also means no task ever waits on a
//! symbol lock while holding database locks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::account::AccountStore;
use crate::engine::MatchingEngine;
use crate::error::EngineError;
use crate::idempotency::IdempotencyGuard;
use crate::ledger::{FillSettlement, Ledger};
use crate::models::{
    Account, Currency, IdempotencyRecord, Order, OrderStatus, OrderType, Quote, Side, Symbol,
    Trade,
};
use crate::money::Money;
use crate::orderbook::{BookOrder, OrderBook};
use crate::orders::OrderStore;
use crate::outbox::Outbox;
use crate::quotes::QuotePort;

/// Outbox topic for trade fan-out
const TRADES_TOPIC: &str = "trades";

/// Idempotency key + fingerprint of the request carrying it
#[derive(Debug, Clone)]
pub struct IdemContext {
    pub key: String,
    pub fingerprint: String,
}

/// Fresh result, or the stored response of an identical earlier request
#[derive(Debug)]
pub enum IdemOutcome<T> {
    Fresh(T),
    Replay(IdempotencyRecord),
}

/// A validated order request (wire parsing happens at the gateway)
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Money>,
    pub qty: Money,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub filled_qty: Money,
    /// Quantity-weighted average fill price, absent when nothing matched
    #[schema(value_type = Option<String>)]
    pub avg_fill_price: Option<Money>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopUpResponse {
    /// USD available balance after the credit
    #[schema(value_type = String)]
    pub balance: Money,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceView {
    pub currency: Currency,
    #[schema(value_type = String)]
    pub available: Money,
    #[schema(value_type = String)]
    pub hold: Money,
    #[schema(value_type = String)]
    pub total: Money,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PositionView {
    pub currency: Currency,
    #[schema(value_type = String)]
    pub qty: Money,
    /// Mid of the current quote, absent when no quote is live
    #[schema(value_type = Option<String>)]
    pub mark_price: Option<Money>,
    #[schema(value_type = Option<String>)]
    pub notional: Option<Money>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PnlView {
    #[schema(value_type = String)]
    pub realized: Money,
    #[schema(value_type = String)]
    pub unrealized: Money,
    #[schema(value_type = String)]
    pub total: Money,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PortfolioResponse {
    pub balances: Vec<BalanceView>,
    pub positions: Vec<PositionView>,
    pub pnl: PnlView,
}

pub struct TradingService {
    pool: PgPool,
    quotes: Arc<dyn QuotePort>,
    books: HashMap<Symbol, Arc<Mutex<OrderBook>>>,
}

impl TradingService {
    pub fn new(pool: PgPool, quotes: Arc<dyn QuotePort>) -> Self {
        let books = Symbol::ALL
            .into_iter()
            .map(|s| (s, Arc::new(Mutex::new(OrderBook::new()))))
            .collect();
        Self {
            pool,
            quotes,
            books,
        }
    }

    fn book(&self, symbol: Symbol) -> Arc<Mutex<OrderBook>> {
        // Books exist for every Symbol variant from construction
        self.books[&symbol].clone()
    }

    /// Rebuild every book from persisted open orders, in original arrival
    /// order, reconstructing price-time priority. Run once at startup.
    ///
    /// Market orders can be left open-by-status when the opposite side ran
    /// out, but they never rest; skip them.
    pub async fn recover_books(&self) -> Result<(), EngineError> {
        for symbol in Symbol::ALL {
            let open_orders = OrderStore::open_by_symbol(&self.pool, symbol).await?;
            let handle = self.book(symbol);
            let mut book = handle.lock().await;
            let mut rested = 0usize;
            for order in open_orders {
                if order.order_type == OrderType::Market {
                    continue;
                }
                let price = order.price.ok_or_else(|| {
                    EngineError::Internal(format!("open limit order {} has no price", order.id))
                })?;
                book.rest_order(
                    order.side,
                    BookOrder {
                        order_id: order.id,
                        user_id: order.user_id,
                        price,
                        qty: order.qty,
                        filled_qty: order.filled_qty,
                    },
                );
                rested += 1;
            }
            tracing::info!(symbol = %symbol, rested, "order book recovered");
        }
        Ok(())
    }

    /// Credit paper USD to a user. Idempotent on (user, key).
    pub async fn top_up(
        &self,
        user_id: Uuid,
        amount: Money,
        idem: &IdemContext,
    ) -> Result<IdemOutcome<TopUpResponse>, EngineError> {
        if let Some(record) =
            IdempotencyGuard::check(&self.pool, user_id, &idem.key, &idem.fingerprint).await?
        {
            return Ok(IdemOutcome::Replay(record));
        }
        if !amount.is_positive() {
            return Err(EngineError::BadRequest("amount must be positive".into()));
        }

        let mut tx = self.pool.begin().await?;
        let account = Ledger::top_up(&mut tx, user_id, amount.clone()).await?;
        let response = TopUpResponse {
            balance: account.balance_available,
        };

        let record = idem_record(user_id, idem, &response)?;
        if !IdempotencyGuard::store(&mut tx, &record).await? {
            // A concurrent duplicate committed first; drop our effect and
            // replay the winner.
            tx.rollback().await?;
            return self.replay_winner(user_id, idem).await;
        }
        tx.commit().await?;

        tracing::info!(user_id = %user_id, amount = %amount, "top-up committed");
        Ok(IdemOutcome::Fresh(response))
    }

    /// Submit an order. Idempotent on (user, key).
    pub async fn create_order(
        &self,
        user_id: Uuid,
        req: CreateOrderRequest,
        idem: &IdemContext,
    ) -> Result<IdemOutcome<CreateOrderResponse>, EngineError> {
        // The guard short-circuits duplicates before anything else, so a
        // retry replays even when the quote has since gone away
        if let Some(record) =
            IdempotencyGuard::check(&self.pool, user_id, &idem.key, &idem.fingerprint).await?
        {
            return Ok(IdemOutcome::Replay(record));
        }

        // 1. Validate
        validate_order_request(&req)?;

        // 2. Price market orders off the quote, outside any lock
        let effective_price = match req.order_type {
            OrderType::Limit => req.price.clone().ok_or_else(|| {
                EngineError::BadRequest("limit orders require a positive price".into())
            })?,
            OrderType::Market => {
                let quote = self
                    .quotes
                    .get(req.symbol)
                    .await
                    .ok_or_else(|| EngineError::NoQuote(req.symbol.to_string()))?;
                match req.side {
                    Side::Buy => quote.ask,
                    Side::Sell => quote.bid,
                }
            }
        };

        // 3. Hold sizing: quote currency at the effective price for buys,
        //    base quantity for sells
        let (hold_currency, hold_amount) = match req.side {
            Side::Buy => (
                req.symbol.quote(),
                effective_price.mul(&req.qty).quantize_down(),
            ),
            Side::Sell => (req.symbol.base(), req.qty.clone()),
        };

        // Single writer per symbol from here through book apply
        let handle = self.book(req.symbol);
        let mut book = handle.lock().await;
        let mut tx = self.pool.begin().await?;

        // 4. Place the hold; INSUFFICIENT_FUNDS aborts with nothing mutated
        Ledger::hold(&mut tx, user_id, hold_currency, hold_amount.clone()).await?;

        // 5. Persist the order as NEW
        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            symbol: req.symbol,
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            qty: req.qty,
            filled_qty: Money::zero(),
            status: OrderStatus::New,
            created_at: Utc::now(),
        };
        OrderStore::insert(&mut tx, &order).await?;

        // 6. Match against the opposite side (plan only; book untouched)
        let plan = MatchingEngine::plan_match(&book, &order);

        // 7. Settle every fill: balanced journals, maker rows, outbox events
        let mut fill_value = Money::zero();
        let mut hold_spent = Money::zero();
        for fill in &plan.fills {
            let settlement = FillSettlement {
                trade_id: fill.trade_id,
                symbol: req.symbol,
                taker_user_id: user_id,
                maker_user_id: fill.maker_user_id,
                taker_side: req.side,
                price: fill.price.clone(),
                qty: fill.qty.clone(),
                taker_hold_price: effective_price.clone(),
            };
            Ledger::settle_fill(&mut tx, &settlement).await?;

            let maker_status = if fill.maker_done {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            OrderStore::set_fill_state(
                &mut tx,
                fill.maker_order_id,
                fill.maker_filled_after.clone(),
                maker_status,
            )
            .await?;

            let trade = Trade {
                id: fill.trade_id,
                symbol: req.symbol,
                taker_side: req.side,
                price: fill.price.clone(),
                qty: fill.qty.clone(),
                taker_user_id: user_id,
                maker_user_id: fill.maker_user_id,
                created_at: Utc::now(),
            };
            Outbox::enqueue(&mut tx, TRADES_TOPIC, &serde_json::to_value(&trade)?).await?;

            fill_value = fill_value.add(&fill.price.mul(&fill.qty));
            hold_spent = hold_spent.add(&match req.side {
                Side::Buy => effective_price.mul(&fill.qty).quantize_down(),
                Side::Sell => fill.qty.clone(),
            });
        }

        // 8. Final taker state
        let status = if plan.filled_qty >= order.qty {
            OrderStatus::Filled
        } else if plan.filled_qty.is_positive() {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::New
        };
        OrderStore::set_fill_state(&mut tx, order.id, plan.filled_qty.clone(), status).await?;

        // Fully filled orders and market remainders never rest, so nothing
        // is attributable to their hold any more: give the leftover back.
        let hold_leftover = hold_amount.sub(&hold_spent);
        let order_terminal = status == OrderStatus::Filled || req.order_type == OrderType::Market;
        if order_terminal && hold_leftover.is_positive() {
            Ledger::release(&mut tx, user_id, hold_currency, hold_leftover).await?;
        }

        // 9. Response + idempotency record, inside the same transaction
        let avg_fill_price = if plan.filled_qty.is_positive() {
            Some(fill_value.checked_div(&plan.filled_qty)?)
        } else {
            None
        };
        let response = CreateOrderResponse {
            order_id: order.id,
            status,
            filled_qty: plan.filled_qty.clone(),
            avg_fill_price,
        };

        let record = idem_record(user_id, idem, &response)?;
        if !IdempotencyGuard::store(&mut tx, &record).await? {
            tx.rollback().await?;
            return self.replay_winner(user_id, idem).await;
        }
        tx.commit().await?;

        // Commit succeeded: now, and only now, mutate the book
        let remainder = plan.rests.then(|| BookOrder {
            order_id: order.id,
            user_id,
            price: effective_price.clone(),
            qty: order.qty.clone(),
            filled_qty: plan.filled_qty.clone(),
        });
        MatchingEngine::apply_plan(&mut book, &plan, remainder).inspect_err(|e| {
            tracing::error!(order_id = %order.id, "book apply failed after commit: {}", e);
        })?;

        tracing::info!(
            order_id = %order.id,
            user_id = %user_id,
            symbol = %req.symbol,
            status = status.as_str(),
            fills = plan.fills.len(),
            "order committed"
        );
        Ok(IdemOutcome::Fresh(response))
    }

    /// Cancel a resting order: remove it from the book, release the hold on
    /// its unfilled remainder, write CANCELED.
    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, EngineError> {
        let initial = OrderStore::get(&self.pool, order_id).await?;
        if initial.user_id != user_id {
            return Err(EngineError::OrderNotFound(order_id.to_string()));
        }

        let handle = self.book(initial.symbol);
        let mut book = handle.lock().await;
        let mut tx = self.pool.begin().await?;

        let order = OrderStore::get_for_update(&mut tx, order_id).await?;
        if !order.status.is_open() {
            return Err(EngineError::BadRequest(format!(
                "order is {}, not open",
                order.status.as_str()
            )));
        }

        let remaining = order.remaining_qty();
        // Market orders never rest and had their leftover hold released at
        // submit; only limit remainders still reserve funds.
        if order.order_type == OrderType::Limit && remaining.is_positive() {
            let price = order.price.clone().ok_or_else(|| {
                EngineError::Internal(format!("limit order {} has no price", order.id))
            })?;
            let (currency, amount) = match order.side {
                Side::Buy => (
                    order.symbol.quote(),
                    price.mul(&remaining).quantize_down(),
                ),
                Side::Sell => (order.symbol.base(), remaining),
            };
            if amount.is_positive() {
                Ledger::release(&mut tx, user_id, currency, amount).await?;
            }
        }

        OrderStore::set_fill_state(
            &mut tx,
            order.id,
            order.filled_qty.clone(),
            OrderStatus::Canceled,
        )
        .await?;
        tx.commit().await?;

        if let Some(price) = order.price.clone() {
            book.cancel_order(order.id, price, order.side);
        }

        tracing::info!(order_id = %order.id, user_id = %user_id, "order canceled");
        Ok(Order {
            status: OrderStatus::Canceled,
            ..order
        })
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, EngineError> {
        OrderStore::get(&self.pool, order_id).await
    }

    pub async fn list_orders(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, EngineError> {
        OrderStore::list_for_user(&self.pool, user_id, limit, offset).await
    }

    /// Balances per currency plus non-USD positions marked at the current
    /// mid quote. No cost basis is tracked, so pnl reports zero.
    pub async fn portfolio(&self, user_id: Uuid) -> Result<PortfolioResponse, EngineError> {
        let accounts = AccountStore::list_for_user(&self.pool, user_id).await?;
        if accounts.is_empty() {
            return Err(EngineError::NotFound);
        }

        let mut balances = Vec::with_capacity(accounts.len());
        let mut positions = Vec::new();
        for account in &accounts {
            let total = account.balance_available.add(&account.balance_hold);
            balances.push(BalanceView {
                currency: account.currency,
                available: account.balance_available.clone(),
                hold: account.balance_hold.clone(),
                total: total.clone(),
            });

            if account.currency != Currency::Usd && !total.is_zero() {
                let mark_price = self.mark_price(account).await?;
                let notional = mark_price
                    .as_ref()
                    .map(|mark| total.mul(mark).quantize_down());
                positions.push(PositionView {
                    currency: account.currency,
                    qty: total,
                    mark_price,
                    notional,
                });
            }
        }

        Ok(PortfolioResponse {
            balances,
            positions,
            pnl: PnlView {
                realized: Money::zero(),
                unrealized: Money::zero(),
                total: Money::zero(),
            },
        })
    }

    pub async fn quote(&self, symbol: Symbol) -> Result<Quote, EngineError> {
        self.quotes
            .get(symbol)
            .await
            .ok_or_else(|| EngineError::NoQuote(symbol.to_string()))
    }

    async fn mark_price(&self, account: &Account) -> Result<Option<Money>, EngineError> {
        let symbol = match account.currency {
            Currency::Btc => Symbol::BtcUsd,
            Currency::Eth => Symbol::EthUsd,
            Currency::Usd => return Ok(None),
        };
        match self.quotes.get(symbol).await {
            Some(q) => {
                let two = Money::from_decimal(bigdecimal::BigDecimal::from(2));
                let mid = q.bid.add(&q.ask).checked_div(&two)?;
                Ok(Some(mid))
            }
            None => Ok(None),
        }
    }

    /// After losing the (user, key) insert race: replay the winner's stored
    /// response, still honouring the fingerprint check.
    async fn replay_winner<T>(
        &self,
        user_id: Uuid,
        idem: &IdemContext,
    ) -> Result<IdemOutcome<T>, EngineError> {
        let record = IdempotencyGuard::get(&self.pool, user_id, &idem.key)
            .await?
            .ok_or_else(|| {
                EngineError::Internal("idempotency record vanished after conflict".into())
            })?;
        if record.request_fingerprint != idem.fingerprint {
            return Err(EngineError::IdemMismatch);
        }
        Ok(IdemOutcome::Replay(record))
    }
}

fn validate_order_request(req: &CreateOrderRequest) -> Result<(), EngineError> {
    if !req.qty.is_positive() {
        return Err(EngineError::BadRequest("qty must be positive".into()));
    }
    match req.order_type {
        OrderType::Limit => match &req.price {
            Some(price) if price.is_positive() => Ok(()),
            _ => Err(EngineError::BadRequest(
                "limit orders require a positive price".into(),
            )),
        },
        OrderType::Market => {
            if req.price.is_some() {
                return Err(EngineError::BadRequest(
                    "market orders must not carry a price".into(),
                ));
            }
            Ok(())
        }
    }
}

fn idem_record<T: Serialize>(
    user_id: Uuid,
    idem: &IdemContext,
    response: &T,
) -> Result<IdempotencyRecord, EngineError> {
    Ok(IdempotencyRecord {
        user_id,
        idem_key: idem.key.clone(),
        request_fingerprint: idem.fingerprint.clone(),
        response_code: 200,
        response_body: serde_json::to_vec(response)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn limit_req(side: Side, price: &str, qty: &str) -> CreateOrderRequest {
        CreateOrderRequest {
            symbol: Symbol::BtcUsd,
            side,
            order_type: OrderType::Limit,
            price: Some(m(price)),
            qty: m(qty),
        }
    }

    #[test]
    fn validate_accepts_limit_with_price() {
        assert!(validate_order_request(&limit_req(Side::Buy, "50000", "0.01")).is_ok());
    }

    #[test]
    fn validate_rejects_nonpositive_qty() {
        let mut req = limit_req(Side::Buy, "50000", "0.01");
        req.qty = Money::zero();
        assert!(validate_order_request(&req).is_err());
        req.qty = m("-1");
        assert!(validate_order_request(&req).is_err());
    }

    #[test]
    fn validate_rejects_limit_without_price() {
        let mut req = limit_req(Side::Sell, "50000", "0.01");
        req.price = None;
        assert!(validate_order_request(&req).is_err());
        req.price = Some(Money::zero());
        assert!(validate_order_request(&req).is_err());
    }

    #[test]
    fn validate_rejects_market_with_price() {
        let req = CreateOrderRequest {
            symbol: Symbol::EthUsd,
            side: Side::Buy,
            order_type: OrderType::Market,
            price: Some(m("3000")),
            qty: m("1"),
        };
        assert!(validate_order_request(&req).is_err());

        let req = CreateOrderRequest {
            order_type: OrderType::Market,
            price: None,
            ..req
        };
        assert!(validate_order_request(&req).is_ok());
    }

    #[test]
    fn idem_record_serialises_response() {
        let idem = IdemContext {
            key: "k1".into(),
            fingerprint: "f".into(),
        };
        let response = TopUpResponse {
            balance: m("10000.00"),
        };
        let record = idem_record(Uuid::new_v4(), &idem, &response).unwrap();
        assert_eq!(record.response_code, 200);
        assert_eq!(
            String::from_utf8(record.response_body).unwrap(),
            "{\"balance\":\"10000.00\"}"
        );
    }
}
