pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod recalc;
pub mod valuation;

pub use config::Config;
pub use datasource::{DataSourceError, MarketDataProvider, MockMarketData, YahooMarketData};
pub use db::{init_db, Repository};
pub use domain::{
    Money, PortfolioId, PortfolioValueRecord, SecurityId, Symbol, Transaction, TransactionKind,
};
pub use engine::{FifoLedger, Position, PositionResolver, PriceResolver, PriceSource};
pub use error::{AppError, DataAccessError};
pub use recalc::{PlannerSettings, RecalcReport, RecalcTrigger, RecalculationPlanner};
pub use valuation::{PerformanceSummary, PortfolioValue, ValuationEngine, ValuationOptions};
