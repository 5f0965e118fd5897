//! Cached portfolio value operations for the repository.

use crate::db::ValueStore;
use crate::domain::{DateSpan, PortfolioId, PortfolioValueRecord};
use crate::error::DataAccessError;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;
use tracing::warn;

use super::{date_from_sql, date_to_sql, money_column, span_from_row, Repository};

#[async_trait]
impl ValueStore for Repository {
    async fn upsert_value(&self, record: &PortfolioValueRecord) -> Result<(), DataAccessError> {
        sqlx::query(
            r#"
            INSERT INTO portfolio_values (portfolio_id, calculation_date, total_value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(portfolio_id, calculation_date) DO UPDATE SET
                total_value = excluded.total_value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.portfolio_id.as_i64())
        .bind(date_to_sql(record.calculation_date))
        .bind(record.total_value.round_currency().to_canonical_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_values_from(
        &self,
        portfolio_id: PortfolioId,
        from: NaiveDate,
    ) -> Result<u64, DataAccessError> {
        let result = sqlx::query(
            "DELETE FROM portfolio_values WHERE portfolio_id = ? AND calculation_date >= ?",
        )
        .bind(portfolio_id.as_i64())
        .bind(date_to_sql(from))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_values_before(
        &self,
        portfolio_id: PortfolioId,
        before: NaiveDate,
    ) -> Result<u64, DataAccessError> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM portfolio_values WHERE portfolio_id = ? AND calculation_date < ?",
        )
        .bind(portfolio_id.as_i64())
        .bind(date_to_sql(before))
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn values_between(
        &self,
        portfolio_id: PortfolioId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PortfolioValueRecord>, DataAccessError> {
        let mut sql = String::from(
            "SELECT calculation_date, total_value FROM portfolio_values WHERE portfolio_id = ?",
        );
        if from.is_some() {
            sql.push_str(" AND calculation_date >= ?");
        }
        if to.is_some() {
            sql.push_str(" AND calculation_date <= ?");
        }
        sql.push_str(" ORDER BY calculation_date ASC");

        let mut query = sqlx::query(&sql).bind(portfolio_id.as_i64());
        if let Some(from) = from {
            query = query.bind(date_to_sql(from));
        }
        if let Some(to) = to {
            query = query.bind(date_to_sql(to));
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let date_raw: String = row.get("calculation_date");
            let (Some(date), Some(total)) = (date_from_sql(&date_raw), money_column(row, "total_value"))
            else {
                warn!(portfolio_id = %portfolio_id, date = %date_raw, "Skipping malformed cached value");
                continue;
            };
            records.push(PortfolioValueRecord::new(portfolio_id, date, total));
        }
        Ok(records)
    }

    async fn value_span(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Option<DateSpan>, DataAccessError> {
        let row = sqlx::query(
            r#"
            SELECT MIN(calculation_date), MAX(calculation_date), COUNT(*)
            FROM portfolio_values
            WHERE portfolio_id = ?
            "#,
        )
        .bind(portfolio_id.as_i64())
        .fetch_one(&self.pool)
        .await?;

        Ok(span_from_row(&row))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_repo;
    use super::*;
    use crate::domain::Money;

    fn m(s: &str) -> Money {
        Money::from_str_canonical(s).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_overwrites_instead_of_duplicating() {
        let (_dir, repo) = temp_repo().await;
        let p = repo.create_portfolio("p", Money::zero()).await.unwrap();

        repo.upsert_value(&PortfolioValueRecord::new(p, day("2024-01-02"), m("100")))
            .await
            .unwrap();
        repo.upsert_value(&PortfolioValueRecord::new(p, day("2024-01-02"), m("125.50")))
            .await
            .unwrap();

        let values = repo.values_between(p, None, None).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].total_value, m("125.50"));
    }

    #[tokio::test]
    async fn test_delete_from_and_count_before() {
        let (_dir, repo) = temp_repo().await;
        let p = repo.create_portfolio("p", Money::zero()).await.unwrap();
        let other = repo.create_portfolio("other", Money::zero()).await.unwrap();

        for d in ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"] {
            repo.upsert_value(&PortfolioValueRecord::new(p, day(d), m("1")))
                .await
                .unwrap();
            repo.upsert_value(&PortfolioValueRecord::new(other, day(d), m("1")))
                .await
                .unwrap();
        }

        assert_eq!(repo.count_values_before(p, day("2024-01-03")).await.unwrap(), 2);
        assert_eq!(repo.delete_values_from(p, day("2024-01-03")).await.unwrap(), 2);

        let span = repo.value_span(p).await.unwrap().unwrap();
        assert_eq!(span.last, day("2024-01-02"));
        assert_eq!(span.count, 2);
        assert_eq!(repo.value_span(other).await.unwrap().unwrap().count, 4);
    }

    #[tokio::test]
    async fn test_values_between_bounds() {
        let (_dir, repo) = temp_repo().await;
        let p = repo.create_portfolio("p", Money::zero()).await.unwrap();
        for (d, v) in [("2024-01-01", "10"), ("2024-01-02", "11"), ("2024-01-03", "12")] {
            repo.upsert_value(&PortfolioValueRecord::new(p, day(d), m(v)))
                .await
                .unwrap();
        }

        let tail = repo
            .values_between(p, Some(day("2024-01-02")), None)
            .await
            .unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].total_value, m("11"));

        let head = repo
            .values_between(p, None, Some(day("2024-01-01")))
            .await
            .unwrap();
        assert_eq!(head.len(), 1);

        assert!(repo.value_span(PortfolioId::new(42)).await.unwrap().is_none());
    }
}
