//! Matching engine - price-time priority matching against the book
//!
//! Matching is split in two phases so the book is only ever mutated after
//! the settlement transaction commits:
//!
//! 1. [`MatchingEngine::plan_match`] walks the opposite side read-only and
//!    produces the ordered fill list (always at the maker's price).
//! 2. [`MatchingEngine::apply_plan`] replays the plan onto the book:
//!    advances maker fills, pops filled makers, drops empty levels and rests
//!    a limit remainder.
//!
//! A rolled-back submit therefore leaves the book untouched; there is no
//! undo path.

use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Order, OrderType, Side};
use crate::money::Money;
use crate::orderbook::{BookOrder, OrderBook};

/// One planned fill against a resting order
#[derive(Debug, Clone)]
pub struct PlannedFill {
    pub trade_id: Uuid,
    pub maker_order_id: Uuid,
    pub maker_user_id: Uuid,
    /// Maker (resting) price
    pub price: Money,
    pub qty: Money,
    pub maker_filled_after: Money,
    pub maker_done: bool,
}

/// Outcome of planning one incoming order against the book
#[derive(Debug)]
pub struct MatchPlan {
    pub taker_order_id: Uuid,
    pub taker_side: Side,
    pub fills: Vec<PlannedFill>,
    /// Total quantity matched for the incoming order
    pub filled_qty: Money,
    /// Limit order with a remainder: rest it after commit
    pub rests: bool,
}

pub struct MatchingEngine;

impl MatchingEngine {
    /// Walk the opposite side in priority order and plan fills for the
    /// incoming order. Read-only: the book is not touched.
    ///
    /// Self-matching is permitted - a user's taker order fills against their
    /// own resting orders like anyone else's.
    pub fn plan_match(book: &OrderBook, incoming: &Order) -> MatchPlan {
        let limit = match incoming.order_type {
            OrderType::Limit => incoming.price.clone(),
            OrderType::Market => None,
        };

        let (fills, filled_qty) = match incoming.side {
            Side::Buy => Self::plan_buy(book, incoming.remaining_qty(), limit),
            Side::Sell => Self::plan_sell(book, incoming.remaining_qty(), limit),
        };

        let fully_filled = filled_qty >= incoming.remaining_qty();
        MatchPlan {
            taker_order_id: incoming.id,
            taker_side: incoming.side,
            filled_qty,
            rests: incoming.order_type == OrderType::Limit && !fully_filled,
            fills,
        }
    }

    /// Plan a buy against the asks: lowest price first, stop above the limit.
    fn plan_buy(
        book: &OrderBook,
        mut remaining: Money,
        limit: Option<Money>,
    ) -> (Vec<PlannedFill>, Money) {
        let mut fills = Vec::new();
        let mut filled = Money::zero();

        'levels: for (price, queue) in book.asks() {
            if let Some(limit) = &limit {
                if price > limit {
                    break;
                }
            }
            for maker in queue {
                if remaining.is_zero() {
                    break 'levels;
                }
                let fill_qty = remaining.clone().min(maker.remaining_qty());
                let maker_filled_after = maker.filled_qty.add(&fill_qty);
                remaining = remaining.sub(&fill_qty);
                filled = filled.add(&fill_qty);
                fills.push(PlannedFill {
                    trade_id: Uuid::new_v4(),
                    maker_order_id: maker.order_id,
                    maker_user_id: maker.user_id,
                    price: price.clone(),
                    qty: fill_qty,
                    maker_done: maker_filled_after >= maker.qty,
                    maker_filled_after,
                });
            }
            if remaining.is_zero() {
                break;
            }
        }

        (fills, filled)
    }

    /// Plan a sell against the bids: highest price first, stop below the
    /// limit.
    fn plan_sell(
        book: &OrderBook,
        mut remaining: Money,
        limit: Option<Money>,
    ) -> (Vec<PlannedFill>, Money) {
        let mut fills = Vec::new();
        let mut filled = Money::zero();

        'levels: for (key, queue) in book.bids() {
            let price = &key.0;
            if let Some(limit) = &limit {
                if price < limit {
                    break;
                }
            }
            for maker in queue {
                if remaining.is_zero() {
                    break 'levels;
                }
                let fill_qty = remaining.clone().min(maker.remaining_qty());
                let maker_filled_after = maker.filled_qty.add(&fill_qty);
                remaining = remaining.sub(&fill_qty);
                filled = filled.add(&fill_qty);
                fills.push(PlannedFill {
                    trade_id: Uuid::new_v4(),
                    maker_order_id: maker.order_id,
                    maker_user_id: maker.user_id,
                    price: price.clone(),
                    qty: fill_qty,
                    maker_done: maker_filled_after >= maker.qty,
                    maker_filled_after,
                });
            }
            if remaining.is_zero() {
                break;
            }
        }

        (fills, filled)
    }

    /// Replay a committed plan onto the book. Fills consume makers strictly
    /// from the front of the best levels, mirroring the planning walk.
    ///
    /// `remainder` is the incoming order's resting projection, present only
    /// when the plan says it rests.
    pub fn apply_plan(
        book: &mut OrderBook,
        plan: &MatchPlan,
        remainder: Option<BookOrder>,
    ) -> Result<(), EngineError> {
        for fill in &plan.fills {
            match plan.taker_side {
                Side::Buy => {
                    let queue = book.asks_mut().get_mut(&fill.price).ok_or_else(|| {
                        EngineError::Internal("book diverged from plan: level gone".into())
                    })?;
                    let maker = queue.front_mut().ok_or_else(|| {
                        EngineError::Internal("book diverged from plan: level empty".into())
                    })?;
                    if maker.order_id != fill.maker_order_id {
                        return Err(EngineError::Internal(
                            "book diverged from plan: unexpected maker".into(),
                        ));
                    }
                    maker.filled_qty = fill.maker_filled_after.clone();
                    if fill.maker_done {
                        queue.pop_front();
                    }
                    if queue.is_empty() {
                        book.asks_mut().remove(&fill.price);
                    }
                }
                Side::Sell => {
                    let key = std::cmp::Reverse(fill.price.clone());
                    let queue = book.bids_mut().get_mut(&key).ok_or_else(|| {
                        EngineError::Internal("book diverged from plan: level gone".into())
                    })?;
                    let maker = queue.front_mut().ok_or_else(|| {
                        EngineError::Internal("book diverged from plan: level empty".into())
                    })?;
                    if maker.order_id != fill.maker_order_id {
                        return Err(EngineError::Internal(
                            "book diverged from plan: unexpected maker".into(),
                        ));
                    }
                    maker.filled_qty = fill.maker_filled_after.clone();
                    if fill.maker_done {
                        queue.pop_front();
                    }
                    if queue.is_empty() {
                        book.bids_mut().remove(&key);
                    }
                }
            }
        }

        if let Some(order) = remainder {
            book.rest_order(plan.taker_side, order);
        }
        Ok(())
    }
}
