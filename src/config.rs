use crate::domain::PortfolioId;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub market_data_url: String,
    /// Days before the valuation date included in a market-data query.
    pub price_lookback_days: u32,
    pub price_source_timeout: Duration,
    pub triggered_window_cap_days: u32,
    pub history_window_cap_days: u32,
    pub rebuild_concurrency: usize,
    pub include_cash: bool,
    pub include_dividends: bool,
    pub portfolio_ids: Vec<PortfolioId>,
    pub recalc_from: Option<NaiveDate>,
    pub force_full: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let market_data_url = env_map
            .get("MARKET_DATA_URL")
            .cloned()
            .unwrap_or_else(|| "https://query1.finance.yahoo.com".to_string());

        let price_lookback_days: u32 = parse_number(&env_map, "PRICE_LOOKBACK_DAYS", 5)?;
        let timeout_ms: u64 = parse_number(&env_map, "PRICE_SOURCE_TIMEOUT_MS", 10_000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "PRICE_SOURCE_TIMEOUT_MS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let triggered_window_cap_days = parse_cap(&env_map, "TRIGGERED_WINDOW_CAP_DAYS", 500)?;
        let history_window_cap_days = parse_cap(&env_map, "HISTORY_WINDOW_CAP_DAYS", 365)?;

        let rebuild_concurrency: usize = parse_number(&env_map, "REBUILD_CONCURRENCY", 1)?;
        if rebuild_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "REBUILD_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let include_cash = parse_bool(&env_map, "INCLUDE_CASH", true)?;
        let include_dividends = parse_bool(&env_map, "INCLUDE_DIVIDENDS", true)?;
        let force_full = parse_bool(&env_map, "FORCE_FULL", false)?;

        let recalc_from = match env_map.get("RECALC_FROM").map(|s| s.trim()) {
            None | Some("") => None,
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ConfigError::InvalidValue(
                    "RECALC_FROM".to_string(),
                    format!("must be a YYYY-MM-DD date, got {}", raw),
                )
            })?),
        };

        let portfolio_ids = parse_portfolio_ids_from_map(&env_map)?;

        Ok(Config {
            database_path,
            market_data_url,
            price_lookback_days,
            price_source_timeout: Duration::from_millis(timeout_ms),
            triggered_window_cap_days,
            history_window_cap_days,
            rebuild_concurrency,
            include_cash,
            include_dividends,
            portfolio_ids,
            recalc_from,
            force_full,
        })
    }
}

fn parse_number<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                format!("must be a non-negative integer, got {}", raw),
            )
        }),
    }
}

fn parse_cap(env_map: &HashMap<String, String>, key: &str, default: u32) -> Result<u32, ConfigError> {
    let cap = parse_number(env_map, key, default)?;
    if cap == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be at least 1 day".to_string(),
        ));
    }
    Ok(cap)
}

fn parse_bool(env_map: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be true or false, got {}", other),
            )),
        },
    }
}

fn parse_portfolio_ids_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Vec<PortfolioId>, ConfigError> {
    let (key, raw) = if let Some(ids) = env_map.get("PORTFOLIO_IDS") {
        ("PORTFOLIO_IDS", ids.replace(',', "\n"))
    } else if let Some(file_path) = env_map.get("PORTFOLIO_IDS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "PORTFOLIO_IDS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        ("PORTFOLIO_IDS_FILE", content)
    } else {
        return Ok(Vec::new());
    };

    raw.lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map(PortfolioId::new).map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), format!("invalid portfolio id {}", s))
            })
        })
        .collect()
}
