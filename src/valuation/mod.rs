//! Portfolio valuation for a single date, plus returns over cached values.

use crate::error::DataAccessError;
use thiserror::Error;

pub mod engine;
pub mod performance;

pub use engine::{
    PortfolioValue, PositionValuation, UnpricedSecurity, ValuationEngine, ValuationMetadata,
    ValuationOptions,
};
pub use performance::PerformanceSummary;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
}
