//! Return figures over cached daily values.

use crate::db::ValueStore;
use crate::domain::{Money, PortfolioId, PortfolioValueRecord};
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::Serialize;

use super::ValuationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_value: Money,
    pub final_value: Money,
    pub total_return_pct: Money,
    /// Compounded yearly rate. `None` for a zero-day period, a non-positive
    /// initial value, or a non-positive final value.
    pub annualized_return_pct: Option<Money>,
    pub period_days: i64,
    pub data_points: usize,
}

impl PerformanceSummary {
    /// Summarize records already ordered by date. `None` when empty.
    pub fn from_values(values: &[PortfolioValueRecord]) -> Option<Self> {
        let first = values.first()?;
        let last = values.last()?;

        let initial = first.total_value;
        let final_value = last.total_value;
        let period_days = (last.calculation_date - first.calculation_date).num_days();

        Some(PerformanceSummary {
            start_date: first.calculation_date,
            end_date: last.calculation_date,
            initial_value: initial,
            final_value,
            total_return_pct: (final_value - initial).percent_of(initial).round_currency(),
            annualized_return_pct: annualized(initial, final_value, period_days),
            period_days,
            data_points: values.len(),
        })
    }

    /// Load cached values in the optional range and summarize them.
    pub async fn load(
        store: &dyn ValueStore,
        portfolio_id: PortfolioId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Option<Self>, ValuationError> {
        let values = store.values_between(portfolio_id, from, to).await?;
        Ok(Self::from_values(&values))
    }
}

fn annualized(initial: Money, final_value: Money, period_days: i64) -> Option<Money> {
    if period_days < 1 || !initial.is_positive() || !final_value.is_positive() {
        return None;
    }
    let ratio = final_value.checked_div(initial)?.inner();
    let exponent = Decimal::from(365).checked_div(Decimal::from(period_days))?;
    let grown = ratio.checked_powd(exponent)?;
    let pct = (grown - Decimal::ONE) * Decimal::ONE_HUNDRED;
    Some(Money::new(pct).round_currency())
}
