use thiserror::Error;

/// Failure reading from or writing to a data-access collaborator.
#[derive(Debug, Error)]
pub enum DataAccessError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("Data access error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
    #[error("Recalculation for portfolio {0} produced no successful valuations")]
    NothingRecalculated(crate::domain::PortfolioId),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DataAccess(DataAccessError::Db(err))
    }
}

impl From<crate::engine::LedgerError> for AppError {
    fn from(err: crate::engine::LedgerError) -> Self {
        match err {
            crate::engine::LedgerError::InvalidInput(msg) => AppError::InvalidInput(msg),
        }
    }
}

impl From<crate::valuation::ValuationError> for AppError {
    fn from(err: crate::valuation::ValuationError) -> Self {
        match err {
            crate::valuation::ValuationError::DataAccess(e) => AppError::DataAccess(e),
        }
    }
}

impl From<crate::recalc::RecalcError> for AppError {
    fn from(err: crate::recalc::RecalcError) -> Self {
        match err {
            crate::recalc::RecalcError::DataAccess(e) => AppError::DataAccess(e),
        }
    }
}
