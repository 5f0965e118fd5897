//! Pure computation engine for lot accounting and price resolution.
//!
//! - `fifo`: per-security lot queue with realized/unrealized gains
//! - `position`: point-in-time positions by replaying the transaction log
//! - `price`: ordered price-source chain with per-source timeouts

pub mod fifo;
pub mod position;
pub mod price;

pub use fifo::{
    FifoLedger, LedgerError, Lot, LotConsumption, PositionSummary, RealizedGainRecord,
    SaleResult, UnrealizedGain,
};
pub use position::{Position, PositionResolver};
pub use price::{
    AttemptOutcome, PriceResolver, PriceSource, PriceUnavailable, ResolvedPrice, SourceAttempt,
};
