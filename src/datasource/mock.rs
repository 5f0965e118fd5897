//! Mock market data for testing without network calls.

use super::{DataSourceError, MarketDataProvider};
use crate::domain::{DailyClose, Money};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock provider serving predefined closes per symbol.
#[derive(Debug, Clone, Default)]
pub struct MockMarketData {
    closes: HashMap<String, Vec<DailyClose>>,
    failure: Option<DataSourceError>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one close for a symbol.
    pub fn with_close(mut self, symbol: &str, date: NaiveDate, close: Money) -> Self {
        let series = self.closes.entry(symbol.to_string()).or_default();
        series.push(DailyClose::new(date, close));
        series.sort_by_key(|c| c.date);
        self
    }

    /// Make every fetch fail with `error`.
    pub fn failing(mut self, error: DataSourceError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Sleep before answering, to exercise caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyClose>, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        Ok(self
            .closes
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|c| c.date >= from && c.date <= to)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
