//! Domain types and determinism layer for portfolio valuation.
//!
//! This module provides:
//! - Fixed-point amounts via the Money wrapper
//! - Domain primitives: PortfolioId, SecurityId, Symbol, TransactionKind
//! - Transaction log entries and their stable ordering key
//! - Persisted value records and daily close observations

pub mod money;
pub mod ordering;
pub mod primitives;
pub mod transaction;
pub mod value;

pub use money::{Money, CURRENCY_DP, SHARE_DP};
pub use ordering::TransactionOrderingKey;
pub use primitives::{PortfolioId, SecurityId, Symbol, TransactionKind, UnknownTransactionKind};
pub use transaction::Transaction;
pub use value::{DailyClose, DateSpan, PortfolioValueRecord};
