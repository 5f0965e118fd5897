//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Data-access traits consumed by the valuation core
//! - Repository implementing those traits over SQLite

pub mod migrations;
pub mod repo;
pub mod traits;

pub use migrations::init_db;
pub use repo::Repository;
pub use traits::{CashLedger, PriceCache, TransactionLog, ValueStore};
