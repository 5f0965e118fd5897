use crate::domain::{
    Money, SecurityId, Symbol, Transaction, TransactionKind, TransactionOrderingKey,
};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use super::fifo::FifoLedger;

/// Holdings of one security as of a date, derived by replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub security_id: SecurityId,
    pub symbol: Symbol,
    /// Shares held at 4 dp.
    pub shares_held: Money,
    /// Average cost per share at 2 dp; zero when flat.
    pub average_cost: Money,
    /// Exact cost basis of the remaining lots.
    pub cost_basis: Money,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        !self.shares_held.is_positive()
    }
}

/// Replays a security's trades up to an as-of date through a fresh ledger.
///
/// Holds no state between calls, so positions for different dates can be
/// resolved in any order or concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionResolver;

impl PositionResolver {
    /// Replay trades dated on or before `as_of` and return the ledger.
    ///
    /// Dividends, and trades with non-positive shares or price, are skipped.
    pub fn replay(transactions: &[Transaction], as_of: NaiveDate) -> FifoLedger {
        let mut trades: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.kind.is_trade() && tx.date <= as_of)
            .collect();
        trades.sort_by_key(|tx| TransactionOrderingKey::from_transaction(tx));

        let mut ledger = FifoLedger::new();
        for tx in trades {
            let Some((shares, price)) = tx.valid_trade_terms() else {
                debug!(transaction_id = tx.id, symbol = %tx.symbol, "Skipping trade with non-positive shares or price");
                continue;
            };

            let outcome = match tx.kind {
                TransactionKind::Buy => ledger.add_purchase(shares, price, tx.date),
                TransactionKind::Sell => match ledger.process_sale(shares, price, tx.date) {
                    Ok(sale) => {
                        if sale.is_oversold() {
                            warn!(
                                transaction_id = tx.id,
                                symbol = %tx.symbol,
                                date = %tx.date,
                                oversold = %sale.oversold_shares,
                                "Sale exceeds held shares, recording matched part only"
                            );
                        }
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
                TransactionKind::Dividend => Ok(()),
            };

            if let Err(e) = outcome {
                warn!(transaction_id = tx.id, symbol = %tx.symbol, error = %e, "Skipping invalid transaction");
            }
        }

        ledger
    }

    /// Resolve the position for one security as of `as_of`.
    pub fn resolve(
        security_id: SecurityId,
        symbol: &Symbol,
        transactions: &[Transaction],
        as_of: NaiveDate,
    ) -> Position {
        let ledger = Self::replay(transactions, as_of);
        Position {
            security_id,
            symbol: symbol.clone(),
            shares_held: ledger.total_shares().round_shares(),
            average_cost: ledger.average_cost(),
            cost_basis: ledger.total_cost_basis(),
        }
    }
}
