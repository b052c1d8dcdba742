// models.rs - Core domain types: currencies, symbols, orders, ledger rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::money::Money;

/// Counterparty for top-ups: one ledger account per currency is materialised
/// under this user id. Its balance may go negative (paper money in
/// circulation).
pub const SYSTEM_USER_ID: Uuid = Uuid::nil();

/// Supported currencies
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Btc,
    Eth,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Btc, Currency::Eth];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Btc => "BTC",
            Currency::Eth => "ETH",
        }
    }
}

impl FromStr for Currency {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "BTC" => Ok(Currency::Btc),
            "ETH" => Ok(Currency::Eth),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported trading pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Symbol {
    #[serde(rename = "BTC-USD")]
    BtcUsd,
    #[serde(rename = "ETH-USD")]
    EthUsd,
}

impl Symbol {
    pub const ALL: [Symbol; 2] = [Symbol::BtcUsd, Symbol::EthUsd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::BtcUsd => "BTC-USD",
            Symbol::EthUsd => "ETH-USD",
        }
    }

    /// Currency bought/sold (BTC or ETH)
    pub fn base(&self) -> Currency {
        match self {
            Symbol::BtcUsd => Currency::Btc,
            Symbol::EthUsd => Currency::Eth,
        }
    }

    /// Currency the pair is priced in (always USD here)
    pub fn quote(&self) -> Currency {
        Currency::Usd
    }
}

impl FromStr for Symbol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC-USD" => Ok(Symbol::BtcUsd),
            "ETH-USD" => Ok(Symbol::EthUsd),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side: buy or sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(()),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Execute at the best available price, sized off the current quote
    Market,
    /// Execute at `price` or better, rest otherwise
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

impl FromStr for OrderType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            _ => Err(()),
        }
    }
}

/// Order lifecycle states. Transitions are one-way out of the terminal
/// states (FILLED, CANCELED, REJECTED).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
        }
    }

    /// Open orders sit in the book; terminal orders never come back.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

impl FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELED" => Ok(OrderStatus::Canceled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            _ => Err(()),
        }
    }
}

/// A user's balance in one currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub balance_available: Money,
    pub balance_hold: Money,
}

/// What a journal entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefType {
    Topup,
    Trade,
    Fee,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Topup => "TOPUP",
            RefType::Trade => "TRADE",
            RefType::Fee => "FEE",
        }
    }
}

impl FromStr for RefType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TOPUP" => Ok(RefType::Topup),
            "TRADE" => Ok(RefType::Trade),
            "FEE" => Ok(RefType::Fee),
            _ => Err(()),
        }
    }
}

/// One line of a double-entry journal. Immutable once written.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub journal_id: Uuid,
    pub account_id: Uuid,
    /// Signed: positive credits the account, negative debits it
    pub amount: Money,
    pub currency: Currency,
    pub ref_type: RefType,
    pub ref_id: Uuid,
}

/// A trading order
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: Symbol,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Present iff the order is LIMIT
    #[schema(value_type = Option<String>)]
    pub price: Option<Money>,
    #[schema(value_type = String)]
    pub qty: Money,
    #[schema(value_type = String)]
    pub filled_qty: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn remaining_qty(&self) -> Money {
        self.qty.sub(&self.filled_qty)
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.filled_qty >= self.qty
    }
}

/// A match between two orders. Produced only by the matching routine;
/// fanned out through the outbox.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Trade {
    pub id: Uuid,
    pub symbol: Symbol,
    pub taker_side: Side,
    /// Always the resting (maker) order's price
    #[schema(value_type = String)]
    pub price: Money,
    #[schema(value_type = String)]
    pub qty: Money,
    pub taker_user_id: Uuid,
    pub maker_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Stored response for a deduplicated request. (user_id, idem_key) is unique.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub user_id: Uuid,
    pub idem_key: String,
    pub request_fingerprint: String,
    pub response_code: i32,
    pub response_body: Vec<u8>,
}

/// Best bid/ask snapshot used to size market orders
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Quote {
    pub symbol: Symbol,
    #[schema(value_type = String)]
    pub bid: Money,
    #[schema(value_type = String)]
    pub ask: Money,
    pub ts: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tokens_roundtrip() {
        assert_eq!("BTC-USD".parse::<Symbol>(), Ok(Symbol::BtcUsd));
        assert_eq!(Symbol::EthUsd.as_str(), "ETH-USD");
        assert_eq!("PARTIALLY_FILLED".parse::<OrderStatus>(), Ok(OrderStatus::PartiallyFilled));
        assert_eq!("MARKET".parse::<OrderType>(), Ok(OrderType::Market));
        assert_eq!("SELL".parse::<Side>(), Ok(Side::Sell));
        assert_eq!("ETH".parse::<Currency>(), Ok(Currency::Eth));
        assert_eq!("TOPUP".parse::<RefType>(), Ok(RefType::Topup));
        assert_eq!(RefType::Fee.as_str(), "FEE");
        assert!("DOGE-USD".parse::<Symbol>().is_err());
    }

    #[test]
    fn symbol_legs() {
        assert_eq!(Symbol::BtcUsd.base(), Currency::Btc);
        assert_eq!(Symbol::BtcUsd.quote(), Currency::Usd);
        assert_eq!(Symbol::EthUsd.base(), Currency::Eth);
    }

    #[test]
    fn status_openness() {
        assert!(OrderStatus::New.is_open());
        assert!(OrderStatus::PartiallyFilled.is_open());
        assert!(!OrderStatus::Filled.is_open());
        assert!(!OrderStatus::Canceled.is_open());
        assert!(!OrderStatus::Rejected.is_open());
    }

    #[test]
    fn serde_uses_uppercase_tokens() {
        let json = serde_json::to_string(&Side::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
        let json = serde_json::to_string(&Symbol::BtcUsd).unwrap();
        assert_eq!(json, "\"BTC-USD\"");
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"PARTIALLY_FILLED\"");
    }

    #[test]
    fn remaining_qty_never_negative() {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            symbol: Symbol::BtcUsd,
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Some("50000".parse().unwrap()),
            qty: "0.01".parse().unwrap(),
            filled_qty: "0.01".parse().unwrap(),
            status: OrderStatus::Filled,
            created_at: Utc::now(),
        };
        assert!(order.is_filled());
        assert_eq!(order.remaining_qty(), Money::zero());
    }
}
