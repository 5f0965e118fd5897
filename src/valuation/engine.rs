use crate::db::{CashLedger, TransactionLog, ValueStore};
use crate::domain::{Money, PortfolioId, PortfolioValueRecord, SecurityId, Symbol, Transaction, TransactionKind};
use crate::engine::{PositionResolver, PriceResolver, PriceSource};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ValuationError;

/// Which non-stock components count toward the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValuationOptions {
    pub include_cash: bool,
    pub include_dividends: bool,
}

impl Default for ValuationOptions {
    fn default() -> Self {
        Self {
            include_cash: true,
            include_dividends: true,
        }
    }
}

/// One held security's contribution to a portfolio value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionValuation {
    pub security_id: SecurityId,
    pub symbol: Symbol,
    pub shares: Money,
    pub average_cost: Money,
    pub cost_basis: Money,
    pub current_price: Money,
    pub price_source: PriceSource,
    pub market_value: Money,
    pub gain_loss: Money,
    pub gain_loss_pct: Money,
    /// Share of the portfolio total, in percent.
    pub weight_pct: Money,
}

/// A held security no source could price on the valuation date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnpricedSecurity {
    pub security_id: SecurityId,
    pub symbol: Symbol,
    pub shares: Money,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValuationMetadata {
    /// Securities with a non-zero position.
    pub position_count: usize,
    pub price_sources: BTreeMap<Symbol, PriceSource>,
    pub unpriced: Vec<UnpricedSecurity>,
    /// Non-fatal failures: unpriced securities and unreadable cash.
    pub error_count: usize,
}

/// Portfolio value on one date with per-position detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioValue {
    pub portfolio_id: PortfolioId,
    pub date: NaiveDate,
    pub stock_value: Money,
    pub cash_value: Money,
    pub dividend_value: Money,
    pub total_value: Money,
    pub positions: Vec<PositionValuation>,
    pub metadata: ValuationMetadata,
}

impl PortfolioValue {
    pub fn record(&self) -> PortfolioValueRecord {
        PortfolioValueRecord::new(self.portfolio_id, self.date, self.total_value)
    }
}

impl fmt::Display for PortfolioValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Portfolio {} on {}", self.portfolio_id, self.date)?;
        writeln!(f, "  Stocks:    {}", self.stock_value)?;
        writeln!(f, "  Cash:      {}", self.cash_value)?;
        writeln!(f, "  Dividends: {}", self.dividend_value)?;
        writeln!(f, "  Total:     {}", self.total_value)?;
        for p in &self.positions {
            writeln!(
                f,
                "  {:<8} {} @ {} = {} ({}%, gain {} / {}%) [{}]",
                p.symbol.as_str(),
                p.shares,
                p.current_price,
                p.market_value,
                p.weight_pct,
                p.gain_loss,
                p.gain_loss_pct,
                p.price_source
            )?;
        }
        for u in &self.metadata.unpriced {
            writeln!(f, "  {:<8} {} unpriced: {}", u.symbol.as_str(), u.shares, u.reason)?;
        }
        Ok(())
    }
}

/// Values a portfolio on a date from its transaction log.
#[derive(Clone)]
pub struct ValuationEngine {
    transactions: Arc<dyn TransactionLog>,
    cash: Arc<dyn CashLedger>,
    values: Arc<dyn ValueStore>,
    prices: PriceResolver,
}

struct PricedPosition {
    security_id: SecurityId,
    symbol: Symbol,
    shares: Money,
    average_cost: Money,
    cost_basis: Money,
    price: Money,
    source: PriceSource,
    market_value: Money,
}

impl ValuationEngine {
    pub fn new(
        transactions: Arc<dyn TransactionLog>,
        cash: Arc<dyn CashLedger>,
        values: Arc<dyn ValueStore>,
        prices: PriceResolver,
    ) -> Self {
        Self {
            transactions,
            cash,
            values,
            prices,
        }
    }

    /// Compute the value without persisting it.
    ///
    /// # Errors
    /// Fails only when the transaction log cannot be read. Missing prices
    /// and unreadable cash are recorded in the metadata instead.
    pub async fn value(
        &self,
        portfolio_id: PortfolioId,
        date: NaiveDate,
        options: ValuationOptions,
    ) -> Result<PortfolioValue, ValuationError> {
        let transactions = self.transactions.transactions_up_to(portfolio_id, date).await?;

        let mut by_security: BTreeMap<SecurityId, Vec<Transaction>> = BTreeMap::new();
        let mut dividend_value = Money::zero();
        for tx in transactions {
            match tx.kind {
                TransactionKind::Buy | TransactionKind::Sell => {
                    by_security.entry(tx.security_id).or_default().push(tx);
                }
                TransactionKind::Dividend => {
                    if options.include_dividends {
                        dividend_value += tx.amount.unwrap_or_default();
                    }
                }
            }
        }

        let mut metadata = ValuationMetadata::default();
        let mut priced = Vec::new();
        for (security_id, trades) in &by_security {
            let Some(symbol) = trades.first().map(|tx| tx.symbol.clone()) else {
                continue;
            };
            let position = PositionResolver::resolve(*security_id, &symbol, trades, date);
            if position.is_flat() {
                continue;
            }
            metadata.position_count += 1;

            match self.prices.resolve(*security_id, &symbol, date).await {
                Ok(resolved) => {
                    metadata.price_sources.insert(symbol.clone(), resolved.source);
                    priced.push(PricedPosition {
                        security_id: *security_id,
                        symbol,
                        shares: position.shares_held,
                        average_cost: position.average_cost,
                        cost_basis: position.cost_basis,
                        price: resolved.price,
                        source: resolved.source,
                        market_value: position.shares_held * resolved.price,
                    });
                }
                Err(unavailable) => {
                    warn!(
                        portfolio_id = %portfolio_id,
                        date = %date,
                        symbol = %symbol,
                        error = %unavailable,
                        "Excluding unpriced security from valuation"
                    );
                    metadata.error_count += 1;
                    metadata.unpriced.push(UnpricedSecurity {
                        security_id: *security_id,
                        symbol,
                        shares: position.shares_held,
                        reason: unavailable.to_string(),
                    });
                }
            }
        }

        let cash_value = if options.include_cash {
            match self.cash.cash_balance(portfolio_id, date).await {
                Ok(cash) => cash,
                Err(e) => {
                    warn!(portfolio_id = %portfolio_id, date = %date, error = %e, "Cash balance unavailable, counting as zero");
                    metadata.error_count += 1;
                    Money::zero()
                }
            }
        } else {
            Money::zero()
        };

        let stock_value: Money = priced.iter().map(|p| p.market_value).sum();
        let total_value = (stock_value + cash_value + dividend_value).round_currency();

        // Weights need the final total, so they are filled in afterwards.
        let positions = priced
            .into_iter()
            .map(|p| {
                let gain_loss = p.market_value - p.cost_basis;
                PositionValuation {
                    security_id: p.security_id,
                    symbol: p.symbol,
                    shares: p.shares,
                    average_cost: p.average_cost,
                    cost_basis: p.cost_basis.round_currency(),
                    current_price: p.price,
                    price_source: p.source,
                    market_value: p.market_value.round_currency(),
                    gain_loss: gain_loss.round_currency(),
                    gain_loss_pct: gain_loss.percent_of(p.cost_basis).round_currency(),
                    weight_pct: p.market_value.percent_of(total_value).round_currency(),
                }
            })
            .collect();

        debug!(
            portfolio_id = %portfolio_id,
            date = %date,
            total = %total_value,
            errors = metadata.error_count,
            "Valued portfolio"
        );

        Ok(PortfolioValue {
            portfolio_id,
            date,
            stock_value: stock_value.round_currency(),
            cash_value: cash_value.round_currency(),
            dividend_value: dividend_value.round_currency(),
            total_value,
            positions,
            metadata,
        })
    }

    /// Compute the value and upsert it as the cached value for `date`.
    pub async fn calculate(
        &self,
        portfolio_id: PortfolioId,
        date: NaiveDate,
        options: ValuationOptions,
    ) -> Result<PortfolioValue, ValuationError> {
        let value = self.value(portfolio_id, date, options).await?;
        self.values.upsert_value(&value.record()).await?;

        debug!(
            portfolio_id = %portfolio_id,
            date = %date,
            total = %value.total_value,
            positions = value.metadata.position_count,
            errors = value.metadata.error_count,
            "Stored portfolio value"
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockMarketData;
    use crate::db::repo::test_support::temp_repo;
    use crate::db::{PriceCache, Repository};
    use crate::domain::{DailyClose, DateSpan};
    use crate::error::DataAccessError;
    use async_trait::async_trait;
    use std::time::Duration;

    fn m(s: &str) -> Money {
        Money::from_str_canonical(s).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn engine_over(repo: Repository, provider: MockMarketData) -> ValuationEngine {
        let repo = Arc::new(repo);
        let prices = PriceResolver::new(
            repo.clone(),
            Arc::new(provider),
            repo.clone(),
            5,
            Duration::from_secs(1),
        );
        ValuationEngine::new(repo.clone(), repo.clone(), repo, prices)
    }

    #[tokio::test]
    async fn test_value_combines_stock_cash_and_dividends() {
        let (_dir, repo) = temp_repo().await;
        let p = repo.create_portfolio("p", m("1000")).await.unwrap();
        let aaa = repo.ensure_security(&Symbol::new("AAA")).await.unwrap();
        let bbb = repo.ensure_security(&Symbol::new("BBB")).await.unwrap();

        repo.record_trade(p, aaa, TransactionKind::Buy, day("2024-01-02"), m("10"), m("100"))
            .await
            .unwrap();
        repo.record_trade(p, bbb, TransactionKind::Buy, day("2024-01-02"), m("5"), m("20"))
            .await
            .unwrap();
        repo.record_trade(p, bbb, TransactionKind::Sell, day("2024-01-03"), m("5"), m("25"))
            .await
            .unwrap();
        repo.record_dividend(p, aaa, day("2024-01-04"), m("12.50"))
            .await
            .unwrap();
        repo.upsert_daily_close(aaa, &DailyClose::new(day("2024-01-04"), m("110")))
            .await
            .unwrap();

        let engine = engine_over(repo, MockMarketData::new());
        let value = engine
            .value(p, day("2024-01-05"), ValuationOptions::default())
            .await
            .unwrap();

        assert_eq!(value.stock_value, m("1100"));
        assert_eq!(value.cash_value, m("1000"));
        assert_eq!(value.dividend_value, m("12.50"));
        assert_eq!(value.total_value, m("2112.50"));
        // BBB is flat and does not appear.
        assert_eq!(value.metadata.position_count, 1);
        assert_eq!(value.positions.len(), 1);

        let aaa_pos = &value.positions[0];
        assert_eq!(aaa_pos.cost_basis, m("1000"));
        assert_eq!(aaa_pos.gain_loss, m("100"));
        assert_eq!(aaa_pos.gain_loss_pct, m("10"));
        assert_eq!(aaa_pos.weight_pct, m("52.07"));
        assert_eq!(aaa_pos.price_source, PriceSource::HistoricalCache);
        assert!(value.to_string().contains("Total:     2112.5"));
    }

    #[tokio::test]
    async fn test_options_exclude_cash_and_dividends() {
        let (_dir, repo) = temp_repo().await;
        let p = repo.create_portfolio("p", m("1000")).await.unwrap();
        let aaa = repo.ensure_security(&Symbol::new("AAA")).await.unwrap();
        repo.record_trade(p, aaa, TransactionKind::Buy, day("2024-01-02"), m("1"), m("50"))
            .await
            .unwrap();
        repo.record_dividend(p, aaa, day("2024-01-03"), m("3"))
            .await
            .unwrap();

        let engine = engine_over(repo, MockMarketData::new());
        let options = ValuationOptions {
            include_cash: false,
            include_dividends: false,
        };
        let value = engine.value(p, day("2024-01-05"), options).await.unwrap();

        // Priced from the last trade.
        assert_eq!(value.total_value, m("50"));
        assert_eq!(value.positions[0].price_source, PriceSource::LastTransaction);
    }

    #[tokio::test]
    async fn test_calculate_is_idempotent() {
        let (_dir, repo) = temp_repo().await;
        let p = repo.create_portfolio("p", m("10")).await.unwrap();
        let store = repo.clone();

        let engine = engine_over(repo, MockMarketData::new());
        let first = engine
            .calculate(p, day("2024-01-05"), ValuationOptions::default())
            .await
            .unwrap();
        let second = engine
            .calculate(p, day("2024-01-05"), ValuationOptions::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        let stored = store.values_between(p, None, None).await.unwrap();
        assert_eq!(stored, vec![first.record()]);
    }

    struct BrokenLog;

    #[async_trait]
    impl TransactionLog for BrokenLog {
        async fn transactions_up_to(
            &self,
            _portfolio_id: PortfolioId,
            _as_of: NaiveDate,
        ) -> Result<Vec<Transaction>, DataAccessError> {
            Err(DataAccessError::Other("log offline".to_string()))
        }

        async fn transaction_span(
            &self,
            _portfolio_id: PortfolioId,
        ) -> Result<Option<DateSpan>, DataAccessError> {
            Err(DataAccessError::Other("log offline".to_string()))
        }

        async fn last_trade_price(
            &self,
            _security_id: SecurityId,
            _as_of: NaiveDate,
        ) -> Result<Option<Money>, DataAccessError> {
            Err(DataAccessError::Other("log offline".to_string()))
        }
    }

    #[async_trait]
    impl PriceCache for BrokenLog {
        async fn close_at_or_before(
            &self,
            _security_id: SecurityId,
            _as_of: NaiveDate,
        ) -> Result<Option<DailyClose>, DataAccessError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_transaction_read_failure_is_fatal() {
        let (_dir, repo) = temp_repo().await;
        let repo = Arc::new(repo);
        let broken = Arc::new(BrokenLog);
        let prices = PriceResolver::new(
            broken.clone(),
            Arc::new(MockMarketData::new()),
            broken.clone(),
            5,
            Duration::from_secs(1),
        );
        let engine = ValuationEngine::new(broken, repo.clone(), repo, prices);

        let result = engine
            .calculate(PortfolioId::new(1), day("2024-01-05"), ValuationOptions::default())
            .await;
        assert!(matches!(result, Err(ValuationError::DataAccess(_))));
    }

    #[tokio::test]
    async fn test_unreadable_cash_counts_as_error() {
        let (_dir, repo) = temp_repo().await;
        let engine = engine_over(repo, MockMarketData::new());

        // No such portfolio, so the cash lookup fails.
        let value = engine
            .value(PortfolioId::new(77), day("2024-01-05"), ValuationOptions::default())
            .await
            .unwrap();
        assert_eq!(value.total_value, Money::zero());
        assert_eq!(value.metadata.error_count, 1);
    }
}
