//! paperspot - transactional core of a paper-trading spot exchange
//!
//! Users hold multi-currency paper balances, deposit synthetic USD and trade
//! BTC-USD / ETH-USD against a central limit order book. Every submitted
//! order either fully completes - funds held, matched, journaled, statuses
//! written - or leaves no trace.
//!
//! # Modules
//!
//! - [`money`] - arbitrary-precision decimal amounts
//! - [`models`] - currencies, symbols, orders, ledger rows
//! - [`error`] - unified error type with stable wire codes
//! - [`db`] - PostgreSQL pool and schema bootstrap
//! - [`account`] - per-(user, currency) balance store
//! - [`ledger`] - double-entry journals, hold/release/settle primitives
//! - [`orders`] - persistent order records
//! - [`orderbook`] - in-memory price-time priority book
//! - [`engine`] - matching (plan / apply)
//! - [`trading`] - order lifecycle orchestration
//! - [`idempotency`] - per-(user, key) request deduplication
//! - [`quotes`] - quote port for market-order pricing
//! - [`outbox`] - transactional trade fan-out
//! - [`users`] - user rows and account materialisation
//! - [`gateway`] - thin axum transport layer

pub mod config;
pub mod logging;

pub mod account;
pub mod db;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod ledger;
pub mod models;
pub mod money;
pub mod orderbook;
pub mod orders;
pub mod outbox;
pub mod quotes;
pub mod trading;
pub mod users;

pub mod gateway;

// Convenient re-exports at crate root
pub use engine::MatchingEngine;
pub use error::EngineError;
pub use models::{Currency, Order, OrderStatus, OrderType, Side, Symbol, Trade};
pub use money::Money;
pub use orderbook::OrderBook;
pub use trading::TradingService;
