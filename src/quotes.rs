//! Quote port - read-only bid/ask snapshots for market-order pricing
//!
//! The feed itself is an external collaborator; the engine only ever reads
//! through [`QuotePort`] and tolerates transient absence by rejecting market
//! orders with NO_QUOTE.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{Quote, Symbol};

/// The seam the order engine consumes quotes through. Implementations must
/// hand out snapshots, never references to mutable price state.
#[async_trait]
pub trait QuotePort: Send + Sync {
    async fn get(&self, symbol: Symbol) -> Option<Quote>;
}

/// In-memory quote board the external feed publishes into. Latest snapshot
/// per symbol wins.
#[derive(Default)]
pub struct QuoteBoard {
    quotes: RwLock<HashMap<Symbol, Quote>>,
}

impl QuoteBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, quote: Quote) {
        self.quotes.write().await.insert(quote.symbol, quote);
    }
}

#[async_trait]
impl QuotePort for QuoteBoard {
    async fn get(&self, symbol: Symbol) -> Option<Quote> {
        self.quotes.read().await.get(&symbol).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn quote(symbol: Symbol, bid: &str, ask: &str) -> Quote {
        Quote {
            symbol,
            bid: bid.parse().unwrap(),
            ask: ask.parse().unwrap(),
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_then_get() {
        let board = QuoteBoard::new();
        board.publish(quote(Symbol::BtcUsd, "49990", "50010")).await;

        let q = board.get(Symbol::BtcUsd).await.unwrap();
        assert_eq!(q.bid, "49990".parse().unwrap());
        assert_eq!(q.ask, "50010".parse().unwrap());
    }

    #[tokio::test]
    async fn missing_symbol_is_none() {
        let board = QuoteBoard::new();
        board.publish(quote(Symbol::BtcUsd, "49990", "50010")).await;

        assert!(board.get(Symbol::EthUsd).await.is_none());
    }

    #[tokio::test]
    async fn latest_snapshot_wins() {
        let board = QuoteBoard::new();
        board.publish(quote(Symbol::EthUsd, "3000", "3001")).await;
        board.publish(quote(Symbol::EthUsd, "3100", "3101")).await;

        let q = board.get(Symbol::EthUsd).await.unwrap();
        assert_eq!(q.bid, "3100".parse().unwrap());
    }
}
