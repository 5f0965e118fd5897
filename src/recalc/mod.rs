//! Incremental rebuild of cached portfolio values after ledger changes.
//!
//! A run has three phases:
//! - scope: pick the first date whose cached value may be stale, capped to a
//!   maximum window ending today
//! - invalidate: delete cached values from that date on, in one statement
//! - rebuild: value every date from the start through today

use crate::domain::{DateSpan, PortfolioId};
use crate::error::DataAccessError;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

pub mod planner;

pub use planner::{PlannerSettings, RecalcTrigger, RecalculationPlanner};

#[derive(Debug, Error)]
pub enum RecalcError {
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
}

/// The window a run will invalidate and rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecalcScope {
    /// Start before capping.
    pub requested_start: NaiveDate,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub capped: bool,
}

impl RecalcScope {
    /// Number of calendar dates in `start..=end`; zero when start is after end.
    pub fn date_count(&self) -> u64 {
        u64::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// Outcome of one recalculation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecalcReport {
    pub portfolio_id: PortfolioId,
    pub scope: RecalcScope,
    /// Cached values removed by the invalidation.
    pub deleted: u64,
    /// Cached values dated before the start, left untouched.
    pub preserved_before: u64,
    pub successes: u64,
    pub failures: u64,
    pub failed_dates: Vec<NaiveDate>,
    /// Dates skipped compared with rebuilding from the first transaction.
    pub days_saved: u64,
}

impl RecalcReport {
    /// False when dates were planned and none could be valued.
    pub fn is_success(&self) -> bool {
        self.successes > 0 || self.scope.date_count() == 0
    }
}

/// Cache and transaction coverage for a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecalcInfo {
    pub portfolio_id: PortfolioId,
    pub cached_values: Option<DateSpan>,
    pub transactions: Option<DateSpan>,
    /// No values are cached yet, so only a full rebuild will populate them.
    pub needs_full_recalc: bool,
}
