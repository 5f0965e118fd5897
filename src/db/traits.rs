//! Data-access contracts consumed by the valuation core.
//!
//! `Repository` implements all of them over SQLite; callers may supply their
//! own implementations.

use crate::domain::{
    DailyClose, DateSpan, Money, PortfolioId, PortfolioValueRecord, SecurityId, Transaction,
};
use crate::error::DataAccessError;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Ordered reads of the transaction log.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// All transactions for a portfolio dated on or before `as_of`, ordered by
    /// (date, id).
    async fn transactions_up_to(
        &self,
        portfolio_id: PortfolioId,
        as_of: NaiveDate,
    ) -> Result<Vec<Transaction>, DataAccessError>;

    /// Date range and count of a portfolio's transactions.
    async fn transaction_span(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Option<DateSpan>, DataAccessError>;

    /// Price of the latest priced trade of a security on or before `as_of`,
    /// across all portfolios.
    async fn last_trade_price(
        &self,
        security_id: SecurityId,
        as_of: NaiveDate,
    ) -> Result<Option<Money>, DataAccessError>;
}

/// Locally cached daily closes.
#[async_trait]
pub trait PriceCache: Send + Sync {
    /// Most recent close dated on or before `as_of`.
    async fn close_at_or_before(
        &self,
        security_id: SecurityId,
        as_of: NaiveDate,
    ) -> Result<Option<DailyClose>, DataAccessError>;
}

/// Portfolio cash figures.
#[async_trait]
pub trait CashLedger: Send + Sync {
    async fn cash_balance(
        &self,
        portfolio_id: PortfolioId,
        as_of: NaiveDate,
    ) -> Result<Money, DataAccessError>;
}

/// Store of cached per-day portfolio values.
#[async_trait]
pub trait ValueStore: Send + Sync {
    /// Insert or overwrite the value for `(portfolio_id, calculation_date)`.
    async fn upsert_value(&self, record: &PortfolioValueRecord) -> Result<(), DataAccessError>;

    /// Delete every value dated on or after `from`, in one statement.
    /// Returns the number of rows removed.
    async fn delete_values_from(
        &self,
        portfolio_id: PortfolioId,
        from: NaiveDate,
    ) -> Result<u64, DataAccessError>;

    async fn count_values_before(
        &self,
        portfolio_id: PortfolioId,
        before: NaiveDate,
    ) -> Result<u64, DataAccessError>;

    /// Values in an optional inclusive range, ordered by date.
    async fn values_between(
        &self,
        portfolio_id: PortfolioId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PortfolioValueRecord>, DataAccessError>;

    async fn value_span(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Option<DateSpan>, DataAccessError>;
}
