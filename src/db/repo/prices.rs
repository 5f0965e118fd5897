//! Daily close cache and cash balance operations for the repository.

use crate::db::{CashLedger, PriceCache};
use crate::domain::{DailyClose, Money, PortfolioId, SecurityId};
use crate::error::DataAccessError;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;
use tracing::warn;

use super::{date_from_sql, date_to_sql, money_column, Repository};

impl Repository {
    /// Insert or overwrite the close for `(security_id, close.date)`.
    pub async fn upsert_daily_close(
        &self,
        security_id: SecurityId,
        close: &DailyClose,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO daily_closes (security_id, close_date, close)
            VALUES (?, ?, ?)
            ON CONFLICT(security_id, close_date) DO UPDATE SET close = excluded.close
            "#,
        )
        .bind(security_id.as_i64())
        .bind(date_to_sql(close.date))
        .bind(close.close.to_canonical_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the cash balance a portfolio held on a date.
    pub async fn record_cash_balance(
        &self,
        portfolio_id: PortfolioId,
        date: NaiveDate,
        balance: Money,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cash_balance_history (portfolio_id, balance_date, balance)
            VALUES (?, ?, ?)
            ON CONFLICT(portfolio_id, balance_date) DO UPDATE SET balance = excluded.balance
            "#,
        )
        .bind(portfolio_id.as_i64())
        .bind(date_to_sql(date))
        .bind(balance.round_currency().to_canonical_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PriceCache for Repository {
    async fn close_at_or_before(
        &self,
        security_id: SecurityId,
        as_of: NaiveDate,
    ) -> Result<Option<DailyClose>, DataAccessError> {
        let row = sqlx::query(
            r#"
            SELECT close_date, close
            FROM daily_closes
            WHERE security_id = ? AND close_date <= ?
            ORDER BY close_date DESC
            LIMIT 1
            "#,
        )
        .bind(security_id.as_i64())
        .bind(date_to_sql(as_of))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let date_raw: String = row.get("close_date");
        let (Some(date), Some(close)) = (date_from_sql(&date_raw), money_column(&row, "close")) else {
            warn!(security_id = %security_id, date = %date_raw, "Ignoring malformed cached close");
            return Ok(None);
        };
        Ok(Some(DailyClose::new(date, close)))
    }
}

#[async_trait]
impl CashLedger for Repository {
    /// Latest recorded balance on or before `as_of`, else the portfolio's
    /// current cash figure.
    async fn cash_balance(
        &self,
        portfolio_id: PortfolioId,
        as_of: NaiveDate,
    ) -> Result<Money, DataAccessError> {
        let historical = sqlx::query(
            r#"
            SELECT balance
            FROM cash_balance_history
            WHERE portfolio_id = ? AND balance_date <= ?
            ORDER BY balance_date DESC
            LIMIT 1
            "#,
        )
        .bind(portfolio_id.as_i64())
        .bind(date_to_sql(as_of))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(balance) = historical.as_ref().and_then(|row| money_column(row, "balance")) {
            return Ok(balance);
        }

        let row = sqlx::query("SELECT cash_balance FROM portfolios WHERE id = ?")
            .bind(portfolio_id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DataAccessError::Other(format!("portfolio {} not found", portfolio_id)))?;

        Ok(money_column(&row, "cash_balance").unwrap_or_default())
    }
}
