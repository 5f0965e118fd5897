//! Market price resolution for a security on a date.
//!
//! Sources are tried in a fixed order and the first one that yields a price
//! wins:
//! - the local daily-close cache (latest close on or before the date)
//! - the external market-data provider, over a short window ending at the date
//! - the price of the latest trade in the security on or before the date
//!
//! A failing or slow source is recorded as an attempt and skipped.

use crate::datasource::MarketDataProvider;
use crate::db::{PriceCache, TransactionLog};
use crate::domain::{Money, SecurityId, Symbol};
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Where a resolved price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    HistoricalCache,
    MarketData,
    LastTransaction,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::HistoricalCache => "historical_cache",
            PriceSource::MarketData => "market_data",
            PriceSource::LastTransaction => "last_transaction",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPrice {
    pub price: Money,
    pub source: PriceSource,
    /// Date of the observation, when the source has one.
    pub observed_on: Option<NaiveDate>,
}

/// Why a source did not produce a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum AttemptOutcome {
    NoData,
    Failed(String),
    TimedOut,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::NoData => write!(f, "no data"),
            AttemptOutcome::Failed(msg) => write!(f, "failed: {}", msg),
            AttemptOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAttempt {
    pub source: PriceSource,
    pub outcome: AttemptOutcome,
}

/// No source yielded a price. The security's value is unknown, not zero.
#[derive(Debug, Clone, Error, Serialize)]
#[error("No price for {symbol} on {date}: {}", describe_attempts(.attempts))]
pub struct PriceUnavailable {
    pub security_id: SecurityId,
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub attempts: Vec<SourceAttempt>,
}

fn describe_attempts(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} {}", a.source, a.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Resolves prices through the cache, provider and last-trade chain.
#[derive(Clone)]
pub struct PriceResolver {
    cache: Arc<dyn PriceCache>,
    provider: Arc<dyn MarketDataProvider>,
    transactions: Arc<dyn TransactionLog>,
    lookback_days: u32,
    source_timeout: Duration,
}

impl PriceResolver {
    pub fn new(
        cache: Arc<dyn PriceCache>,
        provider: Arc<dyn MarketDataProvider>,
        transactions: Arc<dyn TransactionLog>,
        lookback_days: u32,
        source_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            provider,
            transactions,
            lookback_days,
            source_timeout,
        }
    }

    pub async fn resolve(
        &self,
        security_id: SecurityId,
        symbol: &Symbol,
        date: NaiveDate,
    ) -> Result<ResolvedPrice, PriceUnavailable> {
        let mut attempts = Vec::with_capacity(3);

        let cached = bounded(self.source_timeout, async {
            self.cache
                .close_at_or_before(security_id, date)
                .await
                .map(|close| close.map(|c| (c.close, Some(c.date))))
                .map_err(|e| e.to_string())
        })
        .await;
        match cached {
            Ok((price, observed_on)) => {
                return Ok(self.found(symbol, date, price, PriceSource::HistoricalCache, observed_on));
            }
            Err(outcome) => attempts.push(SourceAttempt {
                source: PriceSource::HistoricalCache,
                outcome,
            }),
        }

        let from = date - ChronoDuration::days(i64::from(self.lookback_days));
        let fetched = bounded(self.source_timeout, async {
            self.provider
                .fetch_daily_closes(symbol.as_str(), from, date)
                .await
                .map(|closes| {
                    let usable = || closes.iter().filter(|c| c.close.is_positive());
                    usable()
                        .filter(|c| c.date <= date)
                        .max_by_key(|c| c.date)
                        .or_else(|| usable().min_by_key(|c| c.date))
                        .map(|c| (c.close, Some(c.date)))
                })
                .map_err(|e| e.to_string())
        })
        .await;
        match fetched {
            Ok((price, observed_on)) => {
                return Ok(self.found(symbol, date, price, PriceSource::MarketData, observed_on));
            }
            Err(outcome) => attempts.push(SourceAttempt {
                source: PriceSource::MarketData,
                outcome,
            }),
        }

        let last_trade = bounded(self.source_timeout, async {
            self.transactions
                .last_trade_price(security_id, date)
                .await
                .map(|price| price.map(|p| (p, None)))
                .map_err(|e| e.to_string())
        })
        .await;
        match last_trade {
            Ok((price, observed_on)) => {
                return Ok(self.found(symbol, date, price, PriceSource::LastTransaction, observed_on));
            }
            Err(outcome) => attempts.push(SourceAttempt {
                source: PriceSource::LastTransaction,
                outcome,
            }),
        }

        debug!(security_id = %security_id, symbol = %symbol, date = %date, "No price source yielded a value");
        Err(PriceUnavailable {
            security_id,
            symbol: symbol.clone(),
            date,
            attempts,
        })
    }

    fn found(
        &self,
        symbol: &Symbol,
        date: NaiveDate,
        price: Money,
        source: PriceSource,
        observed_on: Option<NaiveDate>,
    ) -> ResolvedPrice {
        debug!(symbol = %symbol, date = %date, source = %source, price = %price, "Resolved price");
        ResolvedPrice {
            price,
            source,
            observed_on,
        }
    }
}

/// Run one source lookup under `limit`, folding errors, empty answers and
/// timeouts into an [`AttemptOutcome`]. A non-positive price is no answer.
async fn bounded<F>(limit: Duration, lookup: F) -> Result<(Money, Option<NaiveDate>), AttemptOutcome>
where
    F: Future<Output = Result<Option<(Money, Option<NaiveDate>)>, String>>,
{
    match tokio::time::timeout(limit, lookup).await {
        Ok(Ok(Some(found))) if found.0.is_positive() => Ok(found),
        Ok(Ok(_)) => Err(AttemptOutcome::NoData),
        Ok(Err(msg)) => Err(AttemptOutcome::Failed(msg)),
        Err(_) => Err(AttemptOutcome::TimedOut),
    }
}
