//! End-to-end scenarios against a live PostgreSQL instance.
//!
//! These tests exercise the full pipeline (hold -> match -> settle -> status
//! -> idempotency record) and the ledger invariants behind it. They need a
//! database and are `#[ignore]`d by default; point PAPERSPOT_TEST_DATABASE_URL
//! at one to run them (no credentials live in this file):
//!
//!     PAPERSPOT_TEST_DATABASE_URL=postgresql://... cargo test -- --ignored
//!
//! Each test creates its own users, so a shared database is fine.

use std::sync::Arc;

use sqlx::Row;
use uuid::Uuid;

use paperspot::account::AccountStore;
use paperspot::db::Database;
use paperspot::idempotency::{self, IdempotencyGuard};
use paperspot::ledger::Ledger;
use paperspot::models::{Currency, OrderStatus, OrderType, Quote, Side, Symbol};
use paperspot::money::Money;
use paperspot::quotes::QuoteBoard;
use paperspot::trading::{
    CreateOrderRequest, CreateOrderResponse, IdemContext, IdemOutcome, TradingService,
};
use paperspot::users::UserStore;

struct TestEnv {
    db: Database,
    quotes: Arc<QuoteBoard>,
    trading: TradingService,
}

async fn setup() -> TestEnv {
    let url = std::env::var("PAPERSPOT_TEST_DATABASE_URL")
        .expect("set PAPERSPOT_TEST_DATABASE_URL to run database tests");
    let db = Database::connect(&url).await.expect("connect postgres");
    db.init_schema().await.expect("schema bootstrap");
    UserStore::ensure_system_accounts(db.pool())
        .await
        .expect("system accounts");

    let quotes = Arc::new(QuoteBoard::new());
    let trading = TradingService::new(db.pool().clone(), quotes.clone());
    TestEnv {
        db,
        quotes,
        trading,
    }
}

fn m(s: &str) -> Money {
    s.parse().unwrap()
}

fn idem(key: &str, body: &[u8]) -> IdemContext {
    IdemContext {
        key: key.to_string(),
        fingerprint: idempotency::fingerprint(body, &[]),
    }
}

/// Unique per test run so idempotency keys never collide across runs.
fn unique_key(tag: &str) -> String {
    format!("{}-{}", tag, Uuid::new_v4())
}

async fn new_user(env: &TestEnv) -> Uuid {
    UserStore::create(
        env.db.pool(),
        &format!("{}@paperspot.invalid", Uuid::new_v4()),
        "not-a-real-hash",
    )
    .await
    .expect("create user")
}

/// Seed any currency through a balanced TOPUP journal (what the funding
/// collaborator would do for crypto deposits).
async fn seed(env: &TestEnv, user: Uuid, currency: Currency, amount: &str) {
    let mut tx = env.db.pool().begin().await.unwrap();
    Ledger::deposit(&mut tx, user, currency, m(amount))
        .await
        .expect("deposit");
    tx.commit().await.unwrap();
}

async fn top_up(env: &TestEnv, user: Uuid, amount: &str, key: &str) -> IdemOutcome<paperspot::trading::TopUpResponse> {
    let body = format!("{{\"amount\":\"{}\"}}", amount);
    env.trading
        .top_up(user, m(amount), &idem(key, body.as_bytes()))
        .await
        .expect("top_up")
}

async fn balances(env: &TestEnv, user: Uuid, currency: Currency) -> (Money, Money) {
    let account = AccountStore::find(env.db.pool(), user, currency)
        .await
        .expect("find account")
        .expect("account exists");
    (account.balance_available, account.balance_hold)
}

fn limit(side: Side, price: &str, qty: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        symbol: Symbol::BtcUsd,
        side,
        order_type: OrderType::Limit,
        price: Some(m(price)),
        qty: m(qty),
    }
}

fn market(side: Side, qty: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        symbol: Symbol::BtcUsd,
        side,
        order_type: OrderType::Market,
        price: None,
        qty: m(qty),
    }
}

fn fresh<T>(outcome: IdemOutcome<T>) -> T {
    match outcome {
        IdemOutcome::Fresh(value) => value,
        IdemOutcome::Replay(_) => panic!("expected a fresh response, got a replay"),
    }
}

async fn submit(
    env: &TestEnv,
    user: Uuid,
    req: CreateOrderRequest,
    key: &str,
) -> CreateOrderResponse {
    let body = format!("{:?}", req);
    fresh(
        env.trading
            .create_order(user, req, &idem(key, body.as_bytes()))
            .await
            .expect("create_order"),
    )
}

/// Property 1: every journal sums to zero per currency.
async fn assert_journals_balanced(env: &TestEnv) {
    let rows = sqlx::query(
        r#"SELECT journal_id, currency, SUM(amount) AS total
           FROM ledger_entries
           GROUP BY journal_id, currency
           HAVING SUM(amount) <> 0"#,
    )
    .fetch_all(env.db.pool())
    .await
    .unwrap();
    assert!(rows.is_empty(), "unbalanced journals: {} rows", rows.len());
}

/// Properties 2 + 3 for one user: balances non-negative and equal to the
/// signed sum of the account's ledger entries.
async fn assert_balances_match_ledger(env: &TestEnv, user: Uuid) {
    let accounts = AccountStore::list_for_user(env.db.pool(), user)
        .await
        .unwrap();
    for account in accounts {
        assert!(
            !account.balance_available.is_negative(),
            "negative available on {}",
            account.currency
        );
        assert!(
            !account.balance_hold.is_negative(),
            "negative hold on {}",
            account.currency
        );

        let row = sqlx::query(
            r#"SELECT COALESCE(SUM(amount), 0) AS total
               FROM ledger_entries WHERE account_id = $1"#,
        )
        .bind(account.id)
        .fetch_one(env.db.pool())
        .await
        .unwrap();
        let ledger_total: Money = row.get("total");
        let balance_total = account.balance_available.add(&account.balance_hold);
        assert_eq!(
            balance_total, ledger_total,
            "{}: balances diverge from ledger",
            account.currency
        );
    }
}

// ============================================================================
// Seed scenarios
// ============================================================================

#[tokio::test]
#[ignore] // Requires PostgreSQL running
async fn s1_top_up_is_idempotent() {
    let env = setup().await;
    let u1 = new_user(&env).await;
    let key = unique_key("k1");

    let body = b"{\"amount\":\"10000.00\"}";
    let ctx = idem(&key, body);

    let first = fresh(
        env.trading
            .top_up(u1, m("10000.00"), &ctx)
            .await
            .expect("first top-up"),
    );
    assert_eq!(first.balance, m("10000.00"));
    assert_eq!(balances(&env, u1, Currency::Usd).await, (m("10000.00"), Money::zero()));

    // Same key, same fingerprint: replayed byte-identically, no state change
    match env.trading.top_up(u1, m("10000.00"), &ctx).await.unwrap() {
        IdemOutcome::Replay(record) => {
            assert_eq!(record.response_body, serde_json::to_vec(&first).unwrap());
            assert_eq!(record.response_code, 200);
        }
        IdemOutcome::Fresh(_) => panic!("duplicate top-up executed twice"),
    }
    assert_eq!(balances(&env, u1, Currency::Usd).await, (m("10000.00"), Money::zero()));
    assert_journals_balanced(&env).await;
}

#[tokio::test]
#[ignore]
async fn s2_limit_buy_holds_price_times_qty() {
    let env = setup().await;
    let u1 = new_user(&env).await;
    top_up(&env, u1, "10000.00", &unique_key("t")).await;

    let response = submit(&env, u1, limit(Side::Buy, "50000", "0.01"), &unique_key("o1")).await;
    assert_eq!(response.status, OrderStatus::New);
    assert_eq!(response.filled_qty, Money::zero());
    assert_eq!(response.avg_fill_price, None);

    assert_eq!(balances(&env, u1, Currency::Usd).await, (m("9500"), m("500")));
    assert_eq!(balances(&env, u1, Currency::Btc).await, (Money::zero(), Money::zero()));
    assert_balances_match_ledger(&env, u1).await;

    // The locked-read path sees the same state
    let usd = AccountStore::find(env.db.pool(), u1, Currency::Usd)
        .await
        .unwrap()
        .unwrap();
    let mut tx = env.db.pool().begin().await.unwrap();
    let locked = AccountStore::get_by_id(&mut tx, usd.id).await.unwrap();
    assert_eq!(locked.balance_hold, m("500"));
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn s3_price_time_fill_consumes_sellers_in_arrival_order() {
    let env = setup().await;
    let u1 = new_user(&env).await;
    let u2 = new_user(&env).await;
    let u3 = new_user(&env).await;
    let u4 = new_user(&env).await;

    // U1 rests a bid below the sellers' price so it stays untouched
    top_up(&env, u1, "10000.00", &unique_key("t1")).await;
    let resting_bid = submit(&env, u1, limit(Side::Buy, "48000", "0.01"), &unique_key("b1")).await;

    seed(&env, u2, Currency::Btc, "1").await;
    seed(&env, u3, Currency::Btc, "1").await;
    let sell_first = submit(&env, u2, limit(Side::Sell, "49000", "0.005"), &unique_key("s1")).await;
    let sell_second = submit(&env, u3, limit(Side::Sell, "49000", "0.01"), &unique_key("s2")).await;
    assert_eq!(sell_first.status, OrderStatus::New);
    assert_eq!(sell_second.status, OrderStatus::New);

    // Taker market buy 0.01: all of U2 (older), then 0.005 from U3
    top_up(&env, u4, "1000.00", &unique_key("t4")).await;
    env.quotes
        .publish(Quote {
            symbol: Symbol::BtcUsd,
            bid: m("48999"),
            ask: m("49000"),
            ts: chrono::Utc::now(),
        })
        .await;
    let taker = submit(&env, u4, market(Side::Buy, "0.01"), &unique_key("m4")).await;

    assert_eq!(taker.status, OrderStatus::Filled);
    assert_eq!(taker.filled_qty, m("0.01"));
    assert_eq!(taker.avg_fill_price, Some(m("49000")));

    let first = env.trading.get_order(sell_first.order_id).await.unwrap();
    let second = env.trading.get_order(sell_second.order_id).await.unwrap();
    assert_eq!(first.status, OrderStatus::Filled);
    assert_eq!(second.status, OrderStatus::PartiallyFilled);
    assert_eq!(second.filled_qty, m("0.005"));

    // Wrong side: U1's bid is untouched
    let bid = env.trading.get_order(resting_bid.order_id).await.unwrap();
    assert_eq!(bid.status, OrderStatus::New);
    assert_eq!(bid.filled_qty, Money::zero());

    // Money moved: U4 paid 490, got 0.01 BTC
    assert_eq!(balances(&env, u4, Currency::Btc).await, (m("0.01"), Money::zero()));
    assert_eq!(balances(&env, u4, Currency::Usd).await, (m("510"), Money::zero()));
    assert_eq!(balances(&env, u2, Currency::Usd).await.0, m("245"));
    assert_eq!(balances(&env, u2, Currency::Btc).await, (m("0.995"), Money::zero()));
    // U3 still has 0.005 on hold for the open remainder
    assert_eq!(balances(&env, u3, Currency::Btc).await, (m("0.99"), m("0.005")));

    for user in [u1, u2, u3, u4] {
        assert_balances_match_ledger(&env, user).await;
    }
    assert_journals_balanced(&env).await;
}

#[tokio::test]
#[ignore]
async fn s4_same_key_different_body_is_idem_mismatch() {
    let env = setup().await;
    let u1 = new_user(&env).await;
    top_up(&env, u1, "10000.00", &unique_key("t")).await;
    let key = unique_key("o1");

    let req_a = limit(Side::Buy, "50000", "0.01");
    let ctx_a = idem(&key, b"body-a");
    fresh(env.trading.create_order(u1, req_a, &ctx_a).await.unwrap());
    let before = balances(&env, u1, Currency::Usd).await;

    let req_b = limit(Side::Buy, "50000", "0.02");
    let ctx_b = idem(&key, b"body-b");
    let err = env
        .trading
        .create_order(u1, req_b, &ctx_b)
        .await
        .expect_err("reused key with a different body must fail");
    assert_eq!(err.code(), "IDEM_MISMATCH");

    // No new order, no balance change
    assert_eq!(balances(&env, u1, Currency::Usd).await, before);
    let orders = env.trading.list_orders(u1, 50, 0).await.unwrap();
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
#[ignore]
async fn s5_insufficient_funds_leaves_no_trace() {
    let env = setup().await;
    let u5 = new_user(&env).await;
    top_up(&env, u5, "100.00", &unique_key("t")).await;

    let key = unique_key("o5");
    let ctx = idem(&key, b"order-body");
    let err = env
        .trading
        .create_order(u5, limit(Side::Buy, "50000", "0.01"), &ctx)
        .await
        .expect_err("500 USD required, only 100 available");
    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");

    // No order row, no hold, no idempotency record (retry stays possible)
    assert!(env.trading.list_orders(u5, 50, 0).await.unwrap().is_empty());
    assert_eq!(balances(&env, u5, Currency::Usd).await, (m("100.00"), Money::zero()));
    let record = IdempotencyGuard::get(env.db.pool(), u5, &key).await.unwrap();
    assert!(record.is_none(), "failed submit must not store a response");
}

#[tokio::test]
#[ignore]
async fn s6_partial_fill_accounting() {
    let env = setup().await;
    let u1 = new_user(&env).await;
    let u2 = new_user(&env).await;
    let u3 = new_user(&env).await;

    top_up(&env, u1, "5000.00", &unique_key("t1")).await;
    seed(&env, u2, Currency::Btc, "0.007").await;
    seed(&env, u3, Currency::Btc, "0.013").await;

    let buy = submit(&env, u1, limit(Side::Buy, "50000", "0.02"), &unique_key("b")).await;
    assert_eq!(buy.status, OrderStatus::New);
    assert_eq!(balances(&env, u1, Currency::Usd).await, (m("4000"), m("1000")));

    let s1 = submit(&env, u2, limit(Side::Sell, "50000", "0.007"), &unique_key("s1")).await;
    assert_eq!(s1.status, OrderStatus::Filled);
    assert_eq!(s1.avg_fill_price, Some(m("50000")));

    let s2 = submit(&env, u3, limit(Side::Sell, "50000", "0.013"), &unique_key("s2")).await;
    assert_eq!(s2.status, OrderStatus::Filled);

    // U1: 0.02 BTC available, no residual hold, 1000 USD spent in total
    assert_eq!(balances(&env, u1, Currency::Btc).await, (m("0.02"), Money::zero()));
    assert_eq!(balances(&env, u1, Currency::Usd).await, (m("4000"), Money::zero()));

    let buy_order = env.trading.get_order(buy.order_id).await.unwrap();
    assert_eq!(buy_order.status, OrderStatus::Filled);
    assert_eq!(buy_order.filled_qty, m("0.02"));

    for user in [u1, u2, u3] {
        assert_balances_match_ledger(&env, user).await;
    }
    assert_journals_balanced(&env).await;
}

// ============================================================================
// Pinned edge cases and further properties
// ============================================================================

#[tokio::test]
#[ignore]
async fn market_order_without_quote_is_rejected() {
    let env = setup().await;
    let user = new_user(&env).await;
    top_up(&env, user, "1000.00", &unique_key("t")).await;

    // EthUsd has no published quote in this environment
    let req = CreateOrderRequest {
        symbol: Symbol::EthUsd,
        side: Side::Buy,
        order_type: OrderType::Market,
        price: None,
        qty: m("0.1"),
    };
    let err = env
        .trading
        .create_order(user, req, &idem(&unique_key("q"), b"x"))
        .await
        .expect_err("no quote published");
    assert_eq!(err.code(), "NO_QUOTE");
}

#[tokio::test]
#[ignore]
async fn market_sell_beyond_holdings_is_insufficient_funds() {
    let env = setup().await;
    let user = new_user(&env).await;
    seed(&env, user, Currency::Btc, "0.5").await;
    env.quotes
        .publish(Quote {
            symbol: Symbol::BtcUsd,
            bid: m("50000"),
            ask: m("50100"),
            ts: chrono::Utc::now(),
        })
        .await;

    let err = env
        .trading
        .create_order(user, market(Side::Sell, "1"), &idem(&unique_key("ms"), b"x"))
        .await
        .expect_err("selling 1 BTC with 0.5 held");
    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    assert_eq!(balances(&env, user, Currency::Btc).await, (m("0.5"), Money::zero()));
}

#[tokio::test]
#[ignore]
async fn market_buy_remainder_releases_leftover_hold() {
    let env = setup().await;
    let buyer = new_user(&env).await;
    let seller = new_user(&env).await;

    top_up(&env, buyer, "2000.00", &unique_key("t")).await;
    seed(&env, seller, Currency::Btc, "0.01").await;
    submit(&env, seller, limit(Side::Sell, "50000", "0.01"), &unique_key("s")).await;

    env.quotes
        .publish(Quote {
            symbol: Symbol::BtcUsd,
            bid: m("49900"),
            ask: m("50000"),
            ts: chrono::Utc::now(),
        })
        .await;

    // Wants 0.03, the book only carries 0.01: partial fill, never rests,
    // the unspent hold comes straight back
    let response = submit(&env, buyer, market(Side::Buy, "0.03"), &unique_key("m")).await;
    assert_eq!(response.status, OrderStatus::PartiallyFilled);
    assert_eq!(response.filled_qty, m("0.01"));

    assert_eq!(balances(&env, buyer, Currency::Usd).await, (m("1500"), Money::zero()));
    assert_eq!(balances(&env, buyer, Currency::Btc).await, (m("0.01"), Money::zero()));
    assert_balances_match_ledger(&env, buyer).await;
}

#[tokio::test]
#[ignore]
async fn limit_buy_filling_below_limit_releases_surplus_hold() {
    let env = setup().await;
    let buyer = new_user(&env).await;
    let seller = new_user(&env).await;

    top_up(&env, buyer, "1000.00", &unique_key("t")).await;
    seed(&env, seller, Currency::Btc, "0.01").await;
    submit(&env, seller, limit(Side::Sell, "49000", "0.01"), &unique_key("s")).await;

    // Hold is sized at 50000 x 0.01 = 500; the fill happens at 49000,
    // so 10 USD of surplus returns to available within the same commit
    let response = submit(&env, buyer, limit(Side::Buy, "50000", "0.01"), &unique_key("b")).await;
    assert_eq!(response.status, OrderStatus::Filled);
    assert_eq!(response.avg_fill_price, Some(m("49000")));

    assert_eq!(balances(&env, buyer, Currency::Usd).await, (m("510"), Money::zero()));
    assert_eq!(balances(&env, buyer, Currency::Btc).await, (m("0.01"), Money::zero()));
    assert_balances_match_ledger(&env, buyer).await;
    assert_journals_balanced(&env).await;
}

#[tokio::test]
#[ignore]
async fn self_match_is_permitted_and_nets_to_zero() {
    let env = setup().await;
    let user = new_user(&env).await;

    top_up(&env, user, "1000.00", &unique_key("t")).await;
    seed(&env, user, Currency::Btc, "0.01").await;

    submit(&env, user, limit(Side::Sell, "50000", "0.01"), &unique_key("s")).await;
    let buy = submit(&env, user, limit(Side::Buy, "50000", "0.01"), &unique_key("b")).await;
    assert_eq!(buy.status, OrderStatus::Filled);

    // Both legs settled against the same user: balances end where they began
    assert_eq!(balances(&env, user, Currency::Usd).await, (m("1000"), Money::zero()));
    assert_eq!(balances(&env, user, Currency::Btc).await, (m("0.01"), Money::zero()));
    assert_balances_match_ledger(&env, user).await;
    assert_journals_balanced(&env).await;
}

#[tokio::test]
#[ignore]
async fn cancel_releases_remaining_hold_and_leaves_the_book() {
    let env = setup().await;
    let user = new_user(&env).await;
    let seller = new_user(&env).await;

    top_up(&env, user, "1000.00", &unique_key("t")).await;
    let buy = submit(&env, user, limit(Side::Buy, "50000", "0.01"), &unique_key("b")).await;
    assert_eq!(balances(&env, user, Currency::Usd).await, (m("500"), m("500")));

    let canceled = env.trading.cancel_order(user, buy.order_id).await.unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(balances(&env, user, Currency::Usd).await, (m("1000"), Money::zero()));

    // A crossing sell no longer matches the canceled bid
    seed(&env, seller, Currency::Btc, "0.01").await;
    let sell = submit(&env, seller, limit(Side::Sell, "50000", "0.01"), &unique_key("s")).await;
    assert_eq!(sell.status, OrderStatus::New);
    assert_eq!(sell.filled_qty, Money::zero());

    // Cancel is terminal
    let err = env.trading.cancel_order(user, buy.order_id).await.unwrap_err();
    assert_eq!(err.code(), "BAD_REQUEST");
}

#[tokio::test]
#[ignore]
async fn restart_rebuilds_the_book_with_price_time_priority() {
    let env = setup().await;
    let s1 = new_user(&env).await;
    let s2 = new_user(&env).await;
    let buyer = new_user(&env).await;

    seed(&env, s1, Currency::Btc, "1").await;
    seed(&env, s2, Currency::Btc, "1").await;
    let older = submit(&env, s1, limit(Side::Sell, "49000", "0.005"), &unique_key("a")).await;
    let newer = submit(&env, s2, limit(Side::Sell, "49000", "0.01"), &unique_key("b")).await;

    // Simulate a process restart: a fresh service over the same database
    let recovered = TradingService::new(env.db.pool().clone(), env.quotes.clone());
    recovered.recover_books().await.expect("recovery");

    top_up(&env, buyer, "500.00", &unique_key("t")).await;
    env.quotes
        .publish(Quote {
            symbol: Symbol::BtcUsd,
            bid: m("48999"),
            ask: m("49000"),
            ts: chrono::Utc::now(),
        })
        .await;
    let body = b"recovered-taker";
    let taker = fresh(
        recovered
            .create_order(buyer, market(Side::Buy, "0.005"), &idem(&unique_key("m"), body))
            .await
            .unwrap(),
    );
    assert_eq!(taker.status, OrderStatus::Filled);

    // The older resting order is consumed first, exactly as before the crash
    let first = recovered.get_order(older.order_id).await.unwrap();
    let second = recovered.get_order(newer.order_id).await.unwrap();
    assert_eq!(first.status, OrderStatus::Filled);
    assert_eq!(second.status, OrderStatus::New);
}

#[tokio::test]
#[ignore]
async fn portfolio_reports_balances_and_marked_positions() {
    let env = setup().await;
    let user = new_user(&env).await;

    top_up(&env, user, "2500.00", &unique_key("t")).await;
    seed(&env, user, Currency::Eth, "2").await;
    env.quotes
        .publish(Quote {
            symbol: Symbol::EthUsd,
            bid: m("2999"),
            ask: m("3001"),
            ts: chrono::Utc::now(),
        })
        .await;

    let snapshot = env.trading.portfolio(user).await.unwrap();
    assert_eq!(snapshot.balances.len(), 3);

    let usd = snapshot
        .balances
        .iter()
        .find(|b| b.currency == Currency::Usd)
        .unwrap();
    assert_eq!(usd.total, m("2500.00"));

    let eth_position = snapshot
        .positions
        .iter()
        .find(|p| p.currency == Currency::Eth)
        .unwrap();
    assert_eq!(eth_position.qty, m("2"));
    assert_eq!(eth_position.mark_price, Some(m("3000")));
    assert_eq!(eth_position.notional, Some(m("6000")));

    assert_eq!(snapshot.pnl.total, Money::zero());
}

#[tokio::test]
#[ignore]
async fn no_money_creation_across_a_trading_session() {
    let env = setup().await;
    let a = new_user(&env).await;
    let b = new_user(&env).await;

    top_up(&env, a, "10000.00", &unique_key("ta")).await;
    top_up(&env, b, "10000.00", &unique_key("tb")).await;
    seed(&env, a, Currency::Btc, "1").await;
    seed(&env, b, Currency::Btc, "1").await;

    submit(&env, a, limit(Side::Sell, "50000", "0.1"), &unique_key("1")).await;
    submit(&env, b, limit(Side::Buy, "50000", "0.04"), &unique_key("2")).await;
    submit(&env, b, limit(Side::Buy, "49500", "0.02"), &unique_key("3")).await;
    submit(&env, a, limit(Side::Sell, "49500", "0.03"), &unique_key("4")).await;

    // Whatever matched, totals across the two users are conserved
    let (a_usd_avail, a_usd_hold) = balances(&env, a, Currency::Usd).await;
    let (b_usd_avail, b_usd_hold) = balances(&env, b, Currency::Usd).await;
    let usd_total: Money = [a_usd_avail, a_usd_hold, b_usd_avail, b_usd_hold]
        .into_iter()
        .sum();
    assert_eq!(usd_total, m("20000.00"));

    let (a_btc_avail, a_btc_hold) = balances(&env, a, Currency::Btc).await;
    let (b_btc_avail, b_btc_hold) = balances(&env, b, Currency::Btc).await;
    let btc_total: Money = [a_btc_avail, a_btc_hold, b_btc_avail, b_btc_hold]
        .into_iter()
        .sum();
    assert_eq!(btc_total, m("2"));

    assert_balances_match_ledger(&env, a).await;
    assert_balances_match_ledger(&env, b).await;
    assert_journals_balanced(&env).await;
}

#[tokio::test]
#[ignore]
async fn trades_land_in_the_outbox_with_the_settlement() {
    let env = setup().await;
    let seller = new_user(&env).await;
    let buyer = new_user(&env).await;

    seed(&env, seller, Currency::Btc, "0.01").await;
    top_up(&env, buyer, "600.00", &unique_key("t")).await;

    submit(&env, seller, limit(Side::Sell, "50000", "0.01"), &unique_key("s")).await;
    let buy = submit(&env, buyer, limit(Side::Buy, "50000", "0.01"), &unique_key("b")).await;
    assert_eq!(buy.status, OrderStatus::Filled);

    let events = paperspot::outbox::Outbox::fetch_unpublished(env.db.pool(), 1000)
        .await
        .unwrap();
    let ours: Vec<_> = events
        .iter()
        .filter(|e| {
            e.topic == "trades"
                && e.payload["taker_user_id"] == serde_json::json!(buyer.to_string())
        })
        .collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].payload["price"], serde_json::json!("50000"));
    assert_eq!(ours[0].payload["qty"], serde_json::json!("0.01"));

    paperspot::outbox::Outbox::mark_published(env.db.pool(), ours[0].id)
        .await
        .unwrap();
}
