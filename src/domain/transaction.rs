//! Ledger transaction: a buy, sell or dividend event for one security.

use crate::domain::{Money, PortfolioId, SecurityId, Symbol, TransactionKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single entry of the transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Insertion id; breaks ties between transactions on the same date.
    pub id: i64,
    pub portfolio_id: PortfolioId,
    pub security_id: SecurityId,
    pub symbol: Symbol,
    pub kind: TransactionKind,
    pub date: NaiveDate,
    /// Share quantity for buys and sells.
    pub shares: Option<Money>,
    /// Per-share price for buys and sells.
    pub price: Option<Money>,
    /// Cash amount for dividends.
    pub amount: Option<Money>,
}

impl Transaction {
    /// Build a buy or sell entry.
    #[allow(clippy::too_many_arguments)]
    pub fn trade(
        id: i64,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
        symbol: Symbol,
        kind: TransactionKind,
        date: NaiveDate,
        shares: Money,
        price: Money,
    ) -> Self {
        Transaction {
            id,
            portfolio_id,
            security_id,
            symbol,
            kind,
            date,
            shares: Some(shares),
            price: Some(price),
            amount: None,
        }
    }

    /// Build a dividend entry.
    pub fn dividend(
        id: i64,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
        symbol: Symbol,
        date: NaiveDate,
        amount: Money,
    ) -> Self {
        Transaction {
            id,
            portfolio_id,
            security_id,
            symbol,
            kind: TransactionKind::Dividend,
            date,
            shares: None,
            price: None,
            amount: Some(amount),
        }
    }

    /// Shares and price when both are present and strictly positive.
    ///
    /// Malformed trade rows yield `None` and are skipped during replay.
    pub fn valid_trade_terms(&self) -> Option<(Money, Money)> {
        match (self.shares, self.price) {
            (Some(shares), Some(price)) if shares.is_positive() && price.is_positive() => {
                Some((shares, price))
            }
            _ => None,
        }
    }
}
