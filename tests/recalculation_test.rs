use async_trait::async_trait;
use chrono::NaiveDate;
use lotbook::datasource::{DataSourceError, MockMarketData};
use lotbook::db::{init_db, PriceCache, TransactionLog, ValueStore};
use lotbook::domain::{DailyClose, DateSpan, PortfolioValueRecord};
use lotbook::{
    DataAccessError, Money, PerformanceSummary, PlannerSettings, PortfolioId, PriceResolver,
    PriceSource, RecalculationPlanner, Repository, Symbol, TransactionKind, ValuationEngine,
    ValuationOptions,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn d(s: &str) -> Money {
    Money::from_str_canonical(s).unwrap()
}

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

async fn setup_repo() -> (Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (Arc::new(Repository::new(pool)), temp_dir)
}

fn engine_with(
    repo: &Arc<Repository>,
    provider: MockMarketData,
    values: Arc<dyn ValueStore>,
) -> ValuationEngine {
    let prices = PriceResolver::new(
        repo.clone(),
        Arc::new(provider),
        repo.clone(),
        5,
        Duration::from_millis(500),
    );
    ValuationEngine::new(repo.clone(), repo.clone(), values, prices)
}

fn planner_with(
    repo: &Arc<Repository>,
    engine: ValuationEngine,
    settings: PlannerSettings,
    today: &str,
) -> RecalculationPlanner {
    RecalculationPlanner::new(engine, repo.clone(), repo.clone(), settings).with_today(day(today))
}

#[tokio::test]
async fn test_scenario_valuation_after_fifo_sale() {
    let (repo, _temp) = setup_repo().await;
    let p = repo.create_portfolio("growth", d("500")).await.unwrap();
    let xyz = repo.ensure_security(&Symbol::new("XYZ")).await.unwrap();

    for (date, kind, shares, price) in [
        ("2024-01-01", TransactionKind::Buy, "100", "40.00"),
        ("2024-02-01", TransactionKind::Buy, "100", "50.00"),
        ("2024-03-01", TransactionKind::Buy, "100", "60.00"),
        ("2024-04-01", TransactionKind::Sell, "150", "55.00"),
    ] {
        repo.record_trade(p, xyz, kind, day(date), d(shares), d(price))
            .await
            .unwrap();
    }
    repo.upsert_daily_close(xyz, &DailyClose::new(day("2024-04-01"), d("58.00")))
        .await
        .unwrap();

    let engine = engine_with(&repo, MockMarketData::new(), repo.clone());
    let value = engine
        .calculate(p, day("2024-04-02"), ValuationOptions::default())
        .await
        .unwrap();

    let position = &value.positions[0];
    assert_eq!(position.shares, d("150"));
    assert_eq!(position.average_cost, d("56.67"));
    assert_eq!(position.cost_basis, d("8500"));
    assert_eq!(position.market_value, d("8700"));
    assert_eq!(position.gain_loss, d("200"));
    assert_eq!(value.total_value, d("9200"));
}

#[tokio::test]
async fn test_trade_without_price_is_not_a_position() {
    let (repo, _temp) = setup_repo().await;
    let p = repo.create_portfolio("mixed", d("250.25")).await.unwrap();
    let priced = repo.ensure_security(&Symbol::new("AAA")).await.unwrap();
    let dark = repo.ensure_security(&Symbol::new("DARK")).await.unwrap();

    repo.record_trade(p, priced, TransactionKind::Buy, day("2024-05-01"), d("10"), d("20"))
        .await
        .unwrap();
    // DARK's only trade carries a zero price, so it never reaches the ledger.
    repo.record_trade(p, dark, TransactionKind::Buy, day("2024-05-01"), d("5"), Money::zero())
        .await
        .unwrap();
    repo.upsert_daily_close(priced, &DailyClose::new(day("2024-05-02"), d("21")))
        .await
        .unwrap();

    let provider = MockMarketData::new().failing(DataSourceError::HttpError {
        status: 404,
        message: "Not Found".to_string(),
    });
    let engine = engine_with(&repo, provider, repo.clone());
    let value = engine
        .value(p, day("2024-05-03"), ValuationOptions::default())
        .await
        .unwrap();

    assert_eq!(value.stock_value, d("210"));
    assert_eq!(value.total_value, d("460.25"));
    assert_eq!(value.metadata.price_sources.get(&Symbol::new("AAA")), Some(&PriceSource::HistoricalCache));
    // DARK has no valid trade terms, so it is not a position at all.
    assert!(value.metadata.unpriced.is_empty());
}

#[tokio::test]
async fn test_held_security_without_any_price_is_reported() {
    let (repo, _temp) = setup_repo().await;
    let p = repo.create_portfolio("mixed", d("100")).await.unwrap();
    let aaa = repo.ensure_security(&Symbol::new("AAA")).await.unwrap();
    let gone = repo.ensure_security(&Symbol::new("GONE")).await.unwrap();

    repo.record_trade(p, aaa, TransactionKind::Buy, day("2024-05-01"), d("2"), d("10"))
        .await
        .unwrap();
    repo.upsert_daily_close(aaa, &DailyClose::new(day("2024-05-01"), d("10")))
        .await
        .unwrap();
    // GONE has no cached close, the provider is rate limited and the
    // last-trade lookup is stubbed out below.
    repo.record_trade(p, gone, TransactionKind::Buy, day("2024-05-01"), d("3"), d("40"))
        .await
        .unwrap();

    let provider = MockMarketData::new().failing(DataSourceError::RateLimited);
    let prices = PriceResolver::new(
        Arc::new(EmptyCacheFor(repo.clone(), gone)),
        Arc::new(provider),
        Arc::new(NoTradePrices(repo.clone())),
        5,
        Duration::from_millis(500),
    );
    let engine = ValuationEngine::new(repo.clone(), repo.clone(), repo.clone(), prices);

    let value = engine
        .value(p, day("2024-05-02"), ValuationOptions::default())
        .await
        .unwrap();

    assert_eq!(value.metadata.position_count, 2);
    assert_eq!(value.metadata.unpriced.len(), 1);
    assert_eq!(value.metadata.unpriced[0].symbol, Symbol::new("GONE"));
    assert_eq!(value.metadata.error_count, 1);
    assert_eq!(value.stock_value, d("20"));
    assert_eq!(value.total_value, d("120"));
}

#[tokio::test]
async fn test_recalculating_from_date_leaves_earlier_values_unchanged() {
    let (repo, _temp) = setup_repo().await;
    let p = repo.create_portfolio("p", d("1000")).await.unwrap();
    let xyz = repo.ensure_security(&Symbol::new("XYZ")).await.unwrap();
    repo.record_trade(p, xyz, TransactionKind::Buy, day("2024-06-01"), d("10"), d("10"))
        .await
        .unwrap();

    let engine = engine_with(&repo, MockMarketData::new(), repo.clone());
    let planner = planner_with(&repo, engine, PlannerSettings::default(), "2024-06-10");
    planner.recalculate_history(p, None).await.unwrap();
    let before = repo.values_between(p, None, None).await.unwrap();
    assert_eq!(before.len(), 10);

    // Back-dated sell inside the window.
    repo.record_trade(p, xyz, TransactionKind::Sell, day("2024-06-05"), d("4"), d("12"))
        .await
        .unwrap();
    let report = planner
        .recalculate_from_transaction(p, day("2024-06-05"), false)
        .await
        .unwrap();
    assert_eq!(report.deleted, 6);
    assert_eq!(report.preserved_before, 4);
    assert_eq!(report.successes, 6);

    let after = repo.values_between(p, None, None).await.unwrap();
    assert_eq!(after.len(), 10);
    assert_eq!(&after[..4], &before[..4]);
    // 6 shares priced at the latest trade (12) plus unchanged cash.
    assert_eq!(after[4].total_value, d("1072"));
}

#[tokio::test]
async fn test_capped_window_leaves_older_values_stale() {
    let (repo, _temp) = setup_repo().await;
    let p = repo.create_portfolio("p", d("0")).await.unwrap();
    let xyz = repo.ensure_security(&Symbol::new("XYZ")).await.unwrap();
    repo.record_trade(p, xyz, TransactionKind::Buy, day("2024-01-01"), d("1"), d("100"))
        .await
        .unwrap();

    let settings = PlannerSettings {
        triggered_cap_days: 3,
        history_cap_days: 10,
        ..Default::default()
    };
    let engine = engine_with(&repo, MockMarketData::new(), repo.clone());
    let planner = planner_with(&repo, engine, settings, "2024-01-10");
    planner.recalculate_history(p, None).await.unwrap();

    // A back-dated buy older than the triggered cap allows.
    repo.record_trade(p, xyz, TransactionKind::Buy, day("2024-01-02"), d("1"), d("100"))
        .await
        .unwrap();
    let report = planner
        .recalculate_from_transaction(p, day("2024-01-02"), false)
        .await
        .unwrap();

    assert!(report.scope.capped);
    assert_eq!(report.scope.start, day("2024-01-08"));
    assert_eq!(report.successes, 3);
    assert_eq!(report.days_saved, 7);

    let values = repo.values_between(p, None, None).await.unwrap();
    let stale = values
        .iter()
        .find(|v| v.calculation_date == day("2024-01-05"))
        .unwrap();
    assert_eq!(stale.total_value, d("100"));
    let fresh = values
        .iter()
        .find(|v| v.calculation_date == day("2024-01-09"))
        .unwrap();
    assert_eq!(fresh.total_value, d("200"));
}

#[tokio::test]
async fn test_failed_dates_are_counted_without_aborting() {
    let (repo, _temp) = setup_repo().await;
    let p = repo.create_portfolio("p", d("10")).await.unwrap();

    let flaky = Arc::new(FailingWrites {
        inner: repo.clone(),
        fail_on: [day("2024-07-02"), day("2024-07-04")].into_iter().collect(),
    });
    let engine = engine_with(&repo, MockMarketData::new(), flaky);
    let settings = PlannerSettings {
        concurrency: 2,
        ..Default::default()
    };
    let planner = planner_with(&repo, engine, settings, "2024-07-05");

    let report = planner
        .recalculate_from_transaction(p, day("2024-07-01"), false)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.successes, 3);
    assert_eq!(report.failures, 2);
    assert_eq!(report.failed_dates, vec![day("2024-07-02"), day("2024-07-04")]);
    assert_eq!(repo.values_between(p, None, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_zero_successes_is_reported_as_failure() {
    let (repo, _temp) = setup_repo().await;
    let p = repo.create_portfolio("p", d("10")).await.unwrap();

    let all_dates = (1..=3)
        .map(|n| NaiveDate::from_ymd_opt(2024, 7, n).unwrap())
        .collect();
    let flaky = Arc::new(FailingWrites {
        inner: repo.clone(),
        fail_on: all_dates,
    });
    let engine = engine_with(&repo, MockMarketData::new(), flaky);
    let planner = planner_with(&repo, engine, PlannerSettings::default(), "2024-07-03");

    let report = planner
        .recalculate_from_transaction(p, day("2024-07-01"), false)
        .await
        .unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failures, 3);
}

#[tokio::test]
async fn test_performance_over_rebuilt_values() {
    let (repo, _temp) = setup_repo().await;
    let p = repo.create_portfolio("p", d("0")).await.unwrap();
    let xyz = repo.ensure_security(&Symbol::new("XYZ")).await.unwrap();
    repo.record_trade(p, xyz, TransactionKind::Buy, day("2024-03-01"), d("10"), d("100"))
        .await
        .unwrap();
    repo.upsert_daily_close(xyz, &DailyClose::new(day("2024-03-01"), d("100")))
        .await
        .unwrap();
    repo.upsert_daily_close(xyz, &DailyClose::new(day("2024-03-11"), d("110")))
        .await
        .unwrap();

    let engine = engine_with(&repo, MockMarketData::new(), repo.clone());
    let planner = planner_with(&repo, engine, PlannerSettings::default(), "2024-03-11");
    planner.recalculate_history(p, None).await.unwrap();

    let summary = PerformanceSummary::load(repo.as_ref(), p, None, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.initial_value, d("1000"));
    assert_eq!(summary.final_value, d("1100"));
    assert_eq!(summary.total_return_pct, d("10"));
    assert_eq!(summary.period_days, 10);
    assert_eq!(summary.data_points, 11);
}

/// Value store that rejects writes for chosen dates.
struct FailingWrites {
    inner: Arc<Repository>,
    fail_on: HashSet<NaiveDate>,
}

#[async_trait]
impl ValueStore for FailingWrites {
    async fn upsert_value(&self, record: &PortfolioValueRecord) -> Result<(), DataAccessError> {
        if self.fail_on.contains(&record.calculation_date) {
            return Err(DataAccessError::Other("disk full".to_string()));
        }
        self.inner.upsert_value(record).await
    }

    async fn delete_values_from(
        &self,
        portfolio_id: PortfolioId,
        from: NaiveDate,
    ) -> Result<u64, DataAccessError> {
        self.inner.delete_values_from(portfolio_id, from).await
    }

    async fn count_values_before(
        &self,
        portfolio_id: PortfolioId,
        before: NaiveDate,
    ) -> Result<u64, DataAccessError> {
        self.inner.count_values_before(portfolio_id, before).await
    }

    async fn values_between(
        &self,
        portfolio_id: PortfolioId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PortfolioValueRecord>, DataAccessError> {
        self.inner.values_between(portfolio_id, from, to).await
    }

    async fn value_span(&self, portfolio_id: PortfolioId) -> Result<Option<DateSpan>, DataAccessError> {
        self.inner.value_span(portfolio_id).await
    }
}

/// Price cache that has nothing for one security.
struct EmptyCacheFor(Arc<Repository>, lotbook::SecurityId);

#[async_trait]
impl PriceCache for EmptyCacheFor {
    async fn close_at_or_before(
        &self,
        security_id: lotbook::SecurityId,
        as_of: NaiveDate,
    ) -> Result<Option<DailyClose>, DataAccessError> {
        if security_id == self.1 {
            return Ok(None);
        }
        self.0.close_at_or_before(security_id, as_of).await
    }
}

/// Transaction log whose last-trade lookup never finds a price.
struct NoTradePrices(Arc<Repository>);

#[async_trait]
impl TransactionLog for NoTradePrices {
    async fn transactions_up_to(
        &self,
        portfolio_id: PortfolioId,
        as_of: NaiveDate,
    ) -> Result<Vec<lotbook::Transaction>, DataAccessError> {
        self.0.transactions_up_to(portfolio_id, as_of).await
    }

    async fn transaction_span(&self, portfolio_id: PortfolioId) -> Result<Option<DateSpan>, DataAccessError> {
        self.0.transaction_span(portfolio_id).await
    }

    async fn last_trade_price(
        &self,
        _security_id: lotbook::SecurityId,
        _as_of: NaiveDate,
    ) -> Result<Option<Money>, DataAccessError> {
        Ok(None)
    }
}
