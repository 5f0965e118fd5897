//! Yahoo Finance chart API client for historical daily closes.

use super::{DataSourceError, MarketDataProvider};
use crate::domain::{DailyClose, Money};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Market data backed by the public v8 chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooMarketData {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

impl YahooMarketData {
    /// Create a client for `base_url` whose retries stop after `max_elapsed`.
    pub fn new(base_url: String, max_elapsed: Duration) -> Self {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; lotbook/0.1)")
            .timeout(max_elapsed)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_elapsed,
        }
    }

    async fn get_chart(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<String, DataSourceError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let period1 = from.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = (to + ChronoDuration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let query = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_string()),
        ];

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        backoff::Error::transient(DataSourceError::Timeout)
                    } else {
                        backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                    }
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl MarketDataProvider for YahooMarketData {
    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyClose>, DataSourceError> {
        debug!(symbol, %from, %to, "Fetching daily closes");

        let body = self.get_chart(symbol, from, to).await?;
        let mut closes = parse_chart_response(&body)?;
        closes.retain(|c| c.date >= from && c.date <= to);
        Ok(closes)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Parse a chart payload into closes ordered by date.
///
/// Bars with a null close are dropped. Timestamps are shifted by the
/// exchange's GMT offset before taking the calendar date.
fn parse_chart_response(body: &str) -> Result<Vec<DailyClose>, DataSourceError> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| DataSourceError::ParseError(format!("failed to parse chart: {}", e)))?;

    if let Some(error) = response.chart.error.filter(|e| !e.is_null()) {
        return Err(DataSourceError::Other(format!("chart API error: {}", error)));
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let timestamps = result.timestamp.unwrap_or_default();
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };

    let mut closes = Vec::with_capacity(timestamps.len());
    for (ts, close) in timestamps.iter().zip(quote.close.iter()) {
        let Some(close) = close else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts + offset, 0).map(|dt| dt.date_naive()) else {
            warn!(timestamp = ts, "Skipping bar with out-of-range timestamp");
            continue;
        };
        let close = Money::from_str_canonical(&close.to_string())
            .map_err(|e| DataSourceError::ParseError(format!("Invalid close {}: {}", close, e)))?;
        closes.push(DailyClose::new(date, close.round_currency()));
    }

    closes.sort_by_key(|c| c.date);
    Ok(closes)
}
