use crate::db::{TransactionLog, ValueStore};
use crate::domain::PortfolioId;
use crate::valuation::{ValuationEngine, ValuationOptions};
use chrono::{Duration, NaiveDate};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{RecalcError, RecalcInfo, RecalcReport, RecalcScope};

/// Window caps and rebuild parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerSettings {
    /// Cap for runs triggered by a transaction date.
    pub triggered_cap_days: u32,
    /// Cap for general historical rebuilds.
    pub history_cap_days: u32,
    /// Dates valued concurrently. Each date replays independently.
    pub concurrency: usize,
    pub options: ValuationOptions,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            triggered_cap_days: 500,
            history_cap_days: 365,
            concurrency: 1,
            options: ValuationOptions::default(),
        }
    }
}

/// Entry point used for each portfolio of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcTrigger {
    /// Same as [`RecalculationPlanner::recalculate_from_transaction`].
    Transaction { date: NaiveDate, force_full: bool },
    /// Same as [`RecalculationPlanner::recalculate_history`] without `from`.
    History,
}

/// Drives scope, invalidation and rebuild of cached values.
///
/// Assumes at most one run per portfolio at a time; the caller enforces that.
pub struct RecalculationPlanner {
    engine: ValuationEngine,
    transactions: Arc<dyn TransactionLog>,
    values: Arc<dyn ValueStore>,
    settings: PlannerSettings,
    today: Option<NaiveDate>,
}

impl RecalculationPlanner {
    pub fn new(
        engine: ValuationEngine,
        transactions: Arc<dyn TransactionLog>,
        values: Arc<dyn ValueStore>,
        settings: PlannerSettings,
    ) -> Self {
        Self {
            engine,
            transactions,
            values,
            settings,
            today: None,
        }
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Rebuild after a transaction dated `transaction_date` was added,
    /// edited or removed. With `force_full`, rebuild from the first
    /// transaction instead.
    pub async fn recalculate_from_transaction(
        &self,
        portfolio_id: PortfolioId,
        transaction_date: NaiveDate,
        force_full: bool,
    ) -> Result<RecalcReport, RecalcError> {
        let requested = if force_full {
            self.first_transaction_date(portfolio_id)
                .await?
                .unwrap_or(transaction_date)
        } else {
            transaction_date
        };
        let scope = self.scope(requested, self.settings.triggered_cap_days);
        self.run(portfolio_id, scope).await
    }

    /// Rebuild history from `from`, or from the first transaction when
    /// `from` is `None`. A portfolio without transactions is valued for
    /// today only.
    pub async fn recalculate_history(
        &self,
        portfolio_id: PortfolioId,
        from: Option<NaiveDate>,
    ) -> Result<RecalcReport, RecalcError> {
        let requested = match from {
            Some(from) => from,
            None => self
                .first_transaction_date(portfolio_id)
                .await?
                .unwrap_or_else(|| self.today()),
        };
        let scope = self.scope(requested, self.settings.history_cap_days);
        self.run(portfolio_id, scope).await
    }

    /// Recalculate each portfolio in turn. A portfolio whose run fails is
    /// logged and reported; the remaining portfolios still run.
    pub async fn recalculate_portfolios(
        &self,
        portfolio_ids: &[PortfolioId],
        trigger: RecalcTrigger,
    ) -> Vec<(PortfolioId, Result<RecalcReport, RecalcError>)> {
        let mut outcomes = Vec::with_capacity(portfolio_ids.len());
        for &portfolio_id in portfolio_ids {
            let outcome = match trigger {
                RecalcTrigger::Transaction { date, force_full } => {
                    self.recalculate_from_transaction(portfolio_id, date, force_full)
                        .await
                }
                RecalcTrigger::History => self.recalculate_history(portfolio_id, None).await,
            };
            if let Err(e) = &outcome {
                error!(portfolio_id = %portfolio_id, error = %e, "Recalculation aborted");
            }
            outcomes.push((portfolio_id, outcome));
        }
        outcomes
    }

    pub async fn recalculation_info(&self, portfolio_id: PortfolioId) -> Result<RecalcInfo, RecalcError> {
        let cached_values = self.values.value_span(portfolio_id).await?;
        let transactions = self.transactions.transaction_span(portfolio_id).await?;
        Ok(RecalcInfo {
            portfolio_id,
            cached_values,
            transactions,
            needs_full_recalc: cached_values.is_none(),
        })
    }

    async fn first_transaction_date(&self, portfolio_id: PortfolioId) -> Result<Option<NaiveDate>, RecalcError> {
        Ok(self
            .transactions
            .transaction_span(portfolio_id)
            .await?
            .map(|span| span.first))
    }

    /// Window from `requested` through today, pulled forward so it holds at
    /// most `cap_days` dates.
    pub fn scope(&self, requested: NaiveDate, cap_days: u32) -> RecalcScope {
        let end = self.today();
        let earliest_allowed = end - Duration::days(i64::from(cap_days.max(1)) - 1);
        let capped = requested < earliest_allowed;
        RecalcScope {
            requested_start: requested,
            start: if capped { earliest_allowed } else { requested },
            end,
            capped,
        }
    }

    async fn run(&self, portfolio_id: PortfolioId, scope: RecalcScope) -> Result<RecalcReport, RecalcError> {
        if scope.capped {
            warn!(
                portfolio_id = %portfolio_id,
                requested_start = %scope.requested_start,
                start = %scope.start,
                "Recalculation window capped; older cached values are left as they are"
            );
        }

        let preserved_before = self.values.count_values_before(portfolio_id, scope.start).await?;
        let deleted = self.values.delete_values_from(portfolio_id, scope.start).await?;

        let total = scope.date_count();
        info!(
            portfolio_id = %portfolio_id,
            start = %scope.start,
            end = %scope.end,
            dates = total,
            deleted,
            preserved_before,
            "Recalculating portfolio values"
        );

        let engine = &self.engine;
        let options = self.settings.options;
        let mut results = stream::iter(scope.dates())
            .map(|date| async move { (date, engine.calculate(portfolio_id, date, options).await) })
            .buffer_unordered(self.settings.concurrency.max(1));

        let step = if total > 10 { (total / 10).max(1) } else { 0 };
        let mut successes = 0u64;
        let mut failures = 0u64;
        let mut failed_dates = Vec::new();
        while let Some((date, result)) = results.next().await {
            match result {
                Ok(_) => successes += 1,
                Err(e) => {
                    warn!(portfolio_id = %portfolio_id, date = %date, error = %e, "Valuation failed for date");
                    failures += 1;
                    failed_dates.push(date);
                }
            }

            let done = successes + failures;
            if step > 0 && done % step == 0 && done < total {
                info!(
                    portfolio_id = %portfolio_id,
                    done,
                    total,
                    percent = done * 100 / total,
                    "Recalculation progress"
                );
            }
        }
        failed_dates.sort();

        let days_saved = match self.first_transaction_date(portfolio_id).await {
            Ok(Some(first)) if first < scope.start => {
                u64::try_from((scope.start - first).num_days()).unwrap_or(0)
            }
            Ok(_) => 0,
            Err(e) => {
                warn!(portfolio_id = %portfolio_id, error = %e, "Could not read transaction span for report");
                0
            }
        };

        let report = RecalcReport {
            portfolio_id,
            scope,
            deleted,
            preserved_before,
            successes,
            failures,
            failed_dates,
            days_saved,
        };

        if report.is_success() {
            info!(
                portfolio_id = %portfolio_id,
                successes,
                failures,
                days_saved,
                "Recalculation complete"
            );
        } else {
            error!(
                portfolio_id = %portfolio_id,
                failures,
                "Recalculation produced no values"
            );
        }

        Ok(report)
    }
}
