//! Ledger - double-entry journals and fund movement primitives
//!
//! Every movement of money is a journal: a group of entries written together
//! whose signed amounts sum to zero per currency. Holds and releases are
//! balance reclassifications (available <-> hold on one account) and carry no
//! journal; transfers always do.
//!
//! All operations run inside the caller's transaction and lock account rows
//! in ascending account id order.

use std::collections::HashMap;

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::account::AccountStore;
use crate::error::EngineError;
use crate::models::{Account, Currency, LedgerEntry, RefType, Side, Symbol, SYSTEM_USER_ID};
use crate::money::Money;

pub struct Ledger;

/// Everything the ledger needs to settle one fill.
///
/// `taker_hold_price` is the price the taker's hold was sized with (the limit
/// price, or the quoted price for market orders). The taker's hold is always
/// released at that price and paid at the maker price, so a buy that fills at
/// a better price gets its surplus back immediately.
#[derive(Debug, Clone)]
pub struct FillSettlement {
    pub trade_id: Uuid,
    pub symbol: Symbol,
    pub taker_user_id: Uuid,
    pub maker_user_id: Uuid,
    pub taker_side: Side,
    /// Maker (resting) price - the price the trade executed at
    pub price: Money,
    pub qty: Money,
    pub taker_hold_price: Money,
}

impl Ledger {
    /// Append a balanced journal. Rejects any journal whose per-currency sum
    /// is non-zero; an unbalanced journal reaching this point is an invariant
    /// violation, logged at error level before the transaction aborts.
    pub async fn write_journal(
        tx: &mut Transaction<'_, Postgres>,
        entries: &[LedgerEntry],
    ) -> Result<(), EngineError> {
        validate_balanced(entries).inspect_err(|e| {
            tracing::error!("rejecting unbalanced journal: {}", e);
        })?;

        for entry in entries {
            sqlx::query(
                r#"INSERT INTO ledger_entries
                       (journal_id, account_id, amount, currency, ref_type, ref_id)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(entry.journal_id)
            .bind(entry.account_id)
            .bind(entry.amount.clone())
            .bind(entry.currency.as_str())
            .bind(entry.ref_type.as_str())
            .bind(entry.ref_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Credit a user's USD available balance, debiting the system equity
    /// account as counterparty. Returns the updated user account.
    pub async fn top_up(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        amount: Money,
    ) -> Result<Account, EngineError> {
        Self::deposit(tx, user_id, Currency::Usd, amount).await
    }

    /// Credit any currency against system equity with a balanced TOPUP
    /// journal. The USD wire endpoint goes through [`Ledger::top_up`];
    /// crypto funding arrives here.
    pub async fn deposit(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        currency: Currency,
        amount: Money,
    ) -> Result<Account, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::BadRequest("amount must be positive".into()));
        }

        let accounts = AccountStore::lock_for_settlement(
            tx,
            &[(user_id, currency), (SYSTEM_USER_ID, currency)],
        )
        .await?;
        let user_acct = accounts
            .iter()
            .find(|a| a.user_id == user_id)
            .ok_or(EngineError::NotFound)?
            .clone();
        let system_acct = accounts
            .iter()
            .find(|a| a.user_id == SYSTEM_USER_ID)
            .ok_or_else(|| EngineError::Internal("system equity account missing".into()))?
            .clone();

        let journal_id = Uuid::new_v4();
        Self::write_journal(
            tx,
            &[
                LedgerEntry {
                    journal_id,
                    account_id: user_acct.id,
                    amount: amount.clone(),
                    currency,
                    ref_type: RefType::Topup,
                    ref_id: journal_id,
                },
                LedgerEntry {
                    journal_id,
                    account_id: system_acct.id,
                    amount: -amount.clone(),
                    currency,
                    ref_type: RefType::Topup,
                    ref_id: journal_id,
                },
            ],
        )
        .await?;

        let new_available = user_acct.balance_available.add(&amount);
        let system_available = system_acct.balance_available.sub(&amount);

        // Ascending id order, same as the lock order
        for account in &accounts {
            if account.id == user_acct.id {
                AccountStore::update_balances(
                    tx,
                    account.id,
                    new_available.clone(),
                    account.balance_hold.clone(),
                )
                .await?;
            } else {
                AccountStore::update_balances(
                    tx,
                    account.id,
                    system_available.clone(),
                    account.balance_hold.clone(),
                )
                .await?;
            }
        }

        Ok(Account {
            balance_available: new_available,
            ..user_acct
        })
    }

    /// Reserve funds against an open order: available -> hold. No journal;
    /// this is a reclassification, not a movement.
    pub async fn hold(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        currency: Currency,
        amount: Money,
    ) -> Result<(), EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::BadRequest("amount must be positive".into()));
        }

        let account = AccountStore::get(tx, user_id, currency).await?;
        if account.balance_available < amount {
            return Err(EngineError::InsufficientFunds {
                available: account.balance_available.to_string(),
                required: amount.to_string(),
            });
        }

        AccountStore::update_balances(
            tx,
            account.id,
            account.balance_available.sub(&amount),
            account.balance_hold.add(&amount),
        )
        .await
    }

    /// The inverse of [`Ledger::hold`]: hold -> available.
    pub async fn release(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        currency: Currency,
        amount: Money,
    ) -> Result<(), EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::BadRequest("amount must be positive".into()));
        }

        let account = AccountStore::get(tx, user_id, currency).await?;
        if account.balance_hold < amount {
            return Err(EngineError::Internal(format!(
                "release exceeds hold: held={}, requested={}",
                account.balance_hold, amount
            )));
        }

        AccountStore::update_balances(
            tx,
            account.id,
            account.balance_available.add(&amount),
            account.balance_hold.sub(&amount),
        )
        .await
    }

    /// Settle one fill: two balanced journals, one per currency.
    ///
    /// The portion each side pays out of its hold is released to available
    /// first, then transferred, all on the same locked rows. The buyer
    /// releases at the price its hold was sized with and pays at the maker
    /// price; the seller releases exactly the base quantity it delivers.
    pub async fn settle_fill(
        tx: &mut Transaction<'_, Postgres>,
        fill: &FillSettlement,
    ) -> Result<(), EngineError> {
        let base = fill.symbol.base();
        let quote = fill.symbol.quote();
        let (buyer, seller) = match fill.taker_side {
            Side::Buy => (fill.taker_user_id, fill.maker_user_id),
            Side::Sell => (fill.maker_user_id, fill.taker_user_id),
        };
        // The buying side is the taker iff the taker side is BUY; compare by
        // role, not user id, so self-matches release the right hold.
        let buyer_release_price = match fill.taker_side {
            Side::Buy => fill.taker_hold_price.clone(),
            Side::Sell => fill.price.clone(),
        };

        let quote_amount = fill.price.mul(&fill.qty).quantize_down();
        let buyer_release = buyer_release_price.mul(&fill.qty).quantize_down();

        let mut pairs = vec![(buyer, quote), (seller, quote), (seller, base), (buyer, base)];
        pairs.sort();
        pairs.dedup();

        let locked = AccountStore::lock_for_settlement(tx, &pairs).await?;
        let mut accounts: HashMap<(Uuid, Currency), Account> = locked
            .iter()
            .map(|a| ((a.user_id, a.currency), a.clone()))
            .collect();
        if accounts.len() != pairs.len() {
            return Err(EngineError::Internal(
                "settlement account missing".into(),
            ));
        }
        let buyer_usd_id = acct(&accounts, (buyer, quote))?.id;
        let seller_usd_id = acct(&accounts, (seller, quote))?.id;
        let buyer_base_id = acct(&accounts, (buyer, base))?.id;
        let seller_base_id = acct(&accounts, (seller, base))?.id;

        // Quote leg: release the buyer's hold portion, then move the trade
        // value to the seller.
        {
            let buyer_usd = acct_mut(&mut accounts, (buyer, quote))?;
            if buyer_usd.balance_hold < buyer_release {
                return Err(EngineError::Internal(format!(
                    "buyer hold short at settlement: held={}, releasing={}",
                    buyer_usd.balance_hold, buyer_release
                )));
            }
            buyer_usd.balance_hold = buyer_usd.balance_hold.sub(&buyer_release);
            buyer_usd.balance_available = buyer_usd.balance_available.add(&buyer_release);

            if buyer_usd.balance_available < quote_amount {
                return Err(EngineError::InsufficientFunds {
                    available: buyer_usd.balance_available.to_string(),
                    required: quote_amount.to_string(),
                });
            }
            buyer_usd.balance_available = buyer_usd.balance_available.sub(&quote_amount);
        }
        {
            let seller_usd = acct_mut(&mut accounts, (seller, quote))?;
            seller_usd.balance_available = seller_usd.balance_available.add(&quote_amount);
        }

        // Base leg: release the seller's held quantity, then deliver it.
        {
            let seller_base = acct_mut(&mut accounts, (seller, base))?;
            if seller_base.balance_hold < fill.qty {
                return Err(EngineError::Internal(format!(
                    "seller hold short at settlement: held={}, releasing={}",
                    seller_base.balance_hold, fill.qty
                )));
            }
            seller_base.balance_hold = seller_base.balance_hold.sub(&fill.qty);
        }
        {
            let buyer_base = acct_mut(&mut accounts, (buyer, base))?;
            buyer_base.balance_available = buyer_base.balance_available.add(&fill.qty);
        }

        let quote_journal = Uuid::new_v4();
        Self::write_journal(
            tx,
            &[
                LedgerEntry {
                    journal_id: quote_journal,
                    account_id: buyer_usd_id,
                    amount: -quote_amount.clone(),
                    currency: quote,
                    ref_type: RefType::Trade,
                    ref_id: fill.trade_id,
                },
                LedgerEntry {
                    journal_id: quote_journal,
                    account_id: seller_usd_id,
                    amount: quote_amount,
                    currency: quote,
                    ref_type: RefType::Trade,
                    ref_id: fill.trade_id,
                },
            ],
        )
        .await?;

        let base_journal = Uuid::new_v4();
        Self::write_journal(
            tx,
            &[
                LedgerEntry {
                    journal_id: base_journal,
                    account_id: seller_base_id,
                    amount: -fill.qty.clone(),
                    currency: base,
                    ref_type: RefType::Trade,
                    ref_id: fill.trade_id,
                },
                LedgerEntry {
                    journal_id: base_journal,
                    account_id: buyer_base_id,
                    amount: fill.qty.clone(),
                    currency: base,
                    ref_type: RefType::Trade,
                    ref_id: fill.trade_id,
                },
            ],
        )
        .await?;

        // Write balances back in lock (ascending id) order
        let mut updated: Vec<&Account> = accounts.values().collect();
        updated.sort_by_key(|a| a.id);
        for account in updated {
            AccountStore::update_balances(
                tx,
                account.id,
                account.balance_available.clone(),
                account.balance_hold.clone(),
            )
            .await?;
        }

        Ok(())
    }
}

fn acct<'a>(
    accounts: &'a HashMap<(Uuid, Currency), Account>,
    key: (Uuid, Currency),
) -> Result<&'a Account, EngineError> {
    accounts
        .get(&key)
        .ok_or_else(|| EngineError::Internal("settlement account missing".into()))
}

fn acct_mut<'a>(
    accounts: &'a mut HashMap<(Uuid, Currency), Account>,
    key: (Uuid, Currency),
) -> Result<&'a mut Account, EngineError> {
    accounts
        .get_mut(&key)
        .ok_or_else(|| EngineError::Internal("settlement account missing".into()))
}

/// Per-currency zero-sum check. Pure so it can be pinned by unit tests.
fn validate_balanced(entries: &[LedgerEntry]) -> Result<(), EngineError> {
    if entries.is_empty() {
        return Err(EngineError::Internal(
            "journal must have at least one entry".into(),
        ));
    }

    let mut sums: HashMap<Currency, Money> = HashMap::new();
    for entry in entries {
        let sum = sums.entry(entry.currency).or_insert_with(Money::zero);
        *sum = sum.add(&entry.amount);
    }

    for (currency, sum) in &sums {
        if !sum.is_zero() {
            return Err(EngineError::Internal(format!(
                "journal {} is not balanced: {} sums to {}",
                entries[0].journal_id, currency, sum
            )));
        }
    }
    Ok(())
}
