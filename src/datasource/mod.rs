//! External market-data abstraction for historical daily closes.

use crate::domain::DailyClose;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

pub mod mock;
pub mod yahoo;

pub use mock::MockMarketData;
pub use yahoo::YahooMarketData;

/// Provider of historical close-price series.
///
/// Implementations handle retry/backoff themselves and must give up within a
/// bounded time.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + fmt::Debug {
    /// Fetch daily closes for a symbol within a date window.
    ///
    /// # Arguments
    /// * `symbol` - Ticker symbol (e.g., "AAPL")
    /// * `from` - First day of the window (inclusive)
    /// * `to` - Last day of the window (inclusive)
    ///
    /// # Returns
    /// Closes ordered by date ascending; may be empty for non-trading spans.
    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyClose>, DataSourceError>;
}

/// Error type for market-data operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 404 unknown symbol, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// The provider did not answer within the allotted time
    Timeout,
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Timeout => write!(f, "Timed out"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}
