//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `transactions.rs` - Transaction log writes and reads
//! - `prices.rs` - Daily close cache and cash balances
//! - `values.rs` - Cached per-day portfolio values

mod prices;
mod transactions;
mod values;

use crate::domain::{Money, PortfolioId, SecurityId, Symbol};
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Portfolio operations
    // =========================================================================

    /// Create a portfolio with a starting cash balance.
    ///
    /// # Errors
    /// Returns an error if the insert fails (including a duplicate name).
    pub async fn create_portfolio(&self, name: &str, cash: Money) -> Result<PortfolioId, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO portfolios (name, cash_balance, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(cash.round_currency().to_canonical_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(PortfolioId::new(result.last_insert_rowid()))
    }

    /// Overwrite a portfolio's current cash figure.
    pub async fn set_cash_balance(&self, portfolio_id: PortfolioId, cash: Money) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE portfolios SET cash_balance = ? WHERE id = ?")
            .bind(cash.round_currency().to_canonical_string())
            .bind(portfolio_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All portfolio ids, ascending.
    pub async fn list_portfolio_ids(&self) -> Result<Vec<PortfolioId>, sqlx::Error> {
        let rows = sqlx::query("SELECT id FROM portfolios ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| PortfolioId::new(row.get::<i64, _>("id")))
            .collect())
    }

    // =========================================================================
    // Security operations
    // =========================================================================

    /// Return the id for `symbol`, creating the security if needed.
    pub async fn ensure_security(&self, symbol: &Symbol) -> Result<SecurityId, sqlx::Error> {
        sqlx::query("INSERT INTO securities (symbol) VALUES (?) ON CONFLICT(symbol) DO NOTHING")
            .bind(symbol.as_str())
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT id FROM securities WHERE symbol = ?")
            .bind(symbol.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(SecurityId::new(row.get("id")))
    }
}

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn date_from_sql(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Read a nullable TEXT decimal column, logging and dropping unparsable values.
pub(crate) fn money_column(row: &SqliteRow, column: &str) -> Option<Money> {
    let raw: Option<String> = row.get(column);
    let raw = raw?;
    match Money::from_str_canonical(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(column, value = %raw, error = %e, "Invalid decimal in database");
            None
        }
    }
}

/// Assemble a span from `MIN(date), MAX(date), COUNT(*)` columns.
pub(crate) fn span_from_row(row: &SqliteRow) -> Option<crate::domain::DateSpan> {
    let first: Option<String> = row.get(0);
    let last: Option<String> = row.get(1);
    let count: i64 = row.get(2);
    let first = date_from_sql(&first?)?;
    let last = date_from_sql(&last?)?;
    Some(crate::domain::DateSpan {
        first,
        last,
        count: u64::try_from(count).unwrap_or(0),
    })
}
