use lotbook::{
    config::Config, db::init_db, AppError, MarketDataProvider, PlannerSettings, PortfolioId,
    PriceResolver, RecalcTrigger, RecalculationPlanner, Repository, ValuationEngine, ValuationOptions,
    YahooMarketData,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let pool = init_db(&config.database_path).await?;
    let repo = Arc::new(Repository::new(pool));
    let provider: Arc<dyn MarketDataProvider> = Arc::new(YahooMarketData::new(
        config.market_data_url.clone(),
        config.price_source_timeout,
    ));

    let prices = PriceResolver::new(
        repo.clone(),
        provider,
        repo.clone(),
        config.price_lookback_days,
        config.price_source_timeout,
    );
    let engine = ValuationEngine::new(repo.clone(), repo.clone(), repo.clone(), prices);
    let settings = PlannerSettings {
        triggered_cap_days: config.triggered_window_cap_days,
        history_cap_days: config.history_window_cap_days,
        concurrency: config.rebuild_concurrency,
        options: ValuationOptions {
            include_cash: config.include_cash,
            include_dividends: config.include_dividends,
        },
    };
    let planner = RecalculationPlanner::new(engine, repo.clone(), repo.clone(), settings);

    let portfolio_ids: Vec<PortfolioId> = if config.portfolio_ids.is_empty() {
        repo.list_portfolio_ids().await?
    } else {
        config.portfolio_ids.clone()
    };
    tracing::info!(portfolios = portfolio_ids.len(), "Starting recalculation");

    let trigger = match config.recalc_from {
        Some(date) => RecalcTrigger::Transaction {
            date,
            force_full: config.force_full,
        },
        None => RecalcTrigger::History,
    };

    let mut first_failure: Option<AppError> = None;
    for (portfolio_id, outcome) in planner.recalculate_portfolios(&portfolio_ids, trigger).await {
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                eprintln!("portfolio {}: {}", portfolio_id, e);
                first_failure.get_or_insert(e.into());
                continue;
            }
        };

        println!(
            "portfolio {}: {} to {}, {} ok, {} failed{}",
            portfolio_id,
            report.scope.start,
            report.scope.end,
            report.successes,
            report.failures,
            if report.scope.capped { " (window capped)" } else { "" }
        );
        if !report.is_success() {
            first_failure.get_or_insert(AppError::NothingRecalculated(portfolio_id));
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
