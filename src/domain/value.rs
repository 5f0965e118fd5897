//! Persisted per-day portfolio value and market close observations.

use crate::domain::{Money, PortfolioId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One cached portfolio value per portfolio per calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioValueRecord {
    pub portfolio_id: PortfolioId,
    pub calculation_date: NaiveDate,
    /// Total value rounded to 2 fraction digits.
    pub total_value: Money,
}

impl PortfolioValueRecord {
    pub fn new(portfolio_id: PortfolioId, calculation_date: NaiveDate, total_value: Money) -> Self {
        Self {
            portfolio_id,
            calculation_date,
            total_value: total_value.round_currency(),
        }
    }
}

/// A daily closing price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: Money,
}

impl DailyClose {
    pub fn new(date: NaiveDate, close: Money) -> Self {
        Self { date, close }
    }
}

/// Inclusive date span plus row count, used for cache and log introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub count: u64,
}
