//! Stable transaction ordering for deterministic replay.

use crate::domain::Transaction;
use chrono::NaiveDate;

/// Stable ordering key for transactions.
///
/// Ordering: date -> insertion id. Price never participates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransactionOrderingKey {
    pub date: NaiveDate,
    pub id: i64,
}

impl TransactionOrderingKey {
    pub fn from_transaction(tx: &Transaction) -> Self {
        TransactionOrderingKey {
            date: tx.date,
            id: tx.id,
        }
    }
}
