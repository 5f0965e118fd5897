//! Transaction log operations for the repository.

use crate::db::TransactionLog;
use crate::domain::{
    DateSpan, Money, PortfolioId, SecurityId, Symbol, Transaction, TransactionKind,
};
use crate::error::DataAccessError;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use super::{date_from_sql, date_to_sql, money_column, span_from_row, Repository};

impl Repository {
    /// Append a buy or sell to the log. Returns the new transaction id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn record_trade(
        &self,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
        kind: TransactionKind,
        date: NaiveDate,
        shares: Money,
        price: Money,
    ) -> Result<i64, sqlx::Error> {
        self.insert_transaction(portfolio_id, security_id, kind, date, Some(shares), Some(price), None)
            .await
    }

    /// Append a dividend to the log. Returns the new transaction id.
    pub async fn record_dividend(
        &self,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
        date: NaiveDate,
        amount: Money,
    ) -> Result<i64, sqlx::Error> {
        self.insert_transaction(
            portfolio_id,
            security_id,
            TransactionKind::Dividend,
            date,
            None,
            None,
            Some(amount),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_transaction(
        &self,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
        kind: TransactionKind,
        date: NaiveDate,
        shares: Option<Money>,
        price: Option<Money>,
        amount: Option<Money>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (
                portfolio_id, security_id, transaction_type, transaction_date,
                shares, price, amount, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(portfolio_id.as_i64())
        .bind(security_id.as_i64())
        .bind(kind.as_str())
        .bind(date_to_sql(date))
        .bind(shares.map(|d| d.to_canonical_string()))
        .bind(price.map(|d| d.to_canonical_string()))
        .bind(amount.map(|d| d.to_canonical_string()))
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Remove a transaction. Returns its date so the caller can recalculate
    /// from there, or `None` if no such transaction existed.
    pub async fn delete_transaction(&self, id: i64) -> Result<Option<NaiveDate>, sqlx::Error> {
        let row = sqlx::query("SELECT transaction_date FROM transactions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let date: String = row.get("transaction_date");

        sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(date_from_sql(&date))
    }
}

fn transaction_from_row(row: &SqliteRow) -> Option<Transaction> {
    let id: i64 = row.get("id");
    let kind_raw: String = row.get("transaction_type");
    let kind = match kind_raw.parse::<TransactionKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!(transaction_id = id, error = %e, "Skipping transaction with unknown type");
            return None;
        }
    };
    let date_raw: String = row.get("transaction_date");
    let Some(date) = date_from_sql(&date_raw) else {
        warn!(transaction_id = id, value = %date_raw, "Skipping transaction with invalid date");
        return None;
    };

    Some(Transaction {
        id,
        portfolio_id: PortfolioId::new(row.get("portfolio_id")),
        security_id: SecurityId::new(row.get("security_id")),
        symbol: Symbol::new(row.get::<String, _>("symbol")),
        kind,
        date,
        shares: money_column(row, "shares"),
        price: money_column(row, "price"),
        amount: money_column(row, "amount"),
    })
}

#[async_trait]
impl TransactionLog for Repository {
    async fn transactions_up_to(
        &self,
        portfolio_id: PortfolioId,
        as_of: NaiveDate,
    ) -> Result<Vec<Transaction>, DataAccessError> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.portfolio_id, t.security_id, s.symbol, t.transaction_type,
                   t.transaction_date, t.shares, t.price, t.amount
            FROM transactions t
            JOIN securities s ON s.id = t.security_id
            WHERE t.portfolio_id = ? AND t.transaction_date <= ?
            ORDER BY t.transaction_date ASC, t.id ASC
            "#,
        )
        .bind(portfolio_id.as_i64())
        .bind(date_to_sql(as_of))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(transaction_from_row).collect())
    }

    async fn transaction_span(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Option<DateSpan>, DataAccessError> {
        let row = sqlx::query(
            r#"
            SELECT MIN(transaction_date), MAX(transaction_date), COUNT(*)
            FROM transactions
            WHERE portfolio_id = ?
            "#,
        )
        .bind(portfolio_id.as_i64())
        .fetch_one(&self.pool)
        .await?;

        Ok(span_from_row(&row))
    }

    async fn last_trade_price(
        &self,
        security_id: SecurityId,
        as_of: NaiveDate,
    ) -> Result<Option<Money>, DataAccessError> {
        let rows = sqlx::query(
            r#"
            SELECT price
            FROM transactions
            WHERE security_id = ?
              AND transaction_date <= ?
              AND transaction_type IN ('buy', 'sell')
              AND price IS NOT NULL
              AND CAST(price AS REAL) > 0
            ORDER BY transaction_date DESC, id DESC
            LIMIT 10
            "#,
        )
        .bind(security_id.as_i64())
        .bind(date_to_sql(as_of))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| money_column(row, "price"))
            .find(|price| price.is_positive()))
    }
}
