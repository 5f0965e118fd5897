use crate::domain::Money;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Shares bought together at one price on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lot {
    /// Remaining shares; only ever decreases.
    pub shares: Money,
    pub unit_price: Money,
    pub acquired_on: NaiveDate,
    pub original_shares: Money,
}

impl Lot {
    pub fn cost_basis(&self) -> Money {
        self.shares * self.unit_price
    }
}

/// The part of one lot matched against a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotConsumption {
    pub shares: Money,
    pub unit_price: Money,
    pub acquired_on: NaiveDate,
    pub cost_basis: Money,
    pub proceeds: Money,
    pub gain_loss: Money,
}

/// Audit record appended for every processed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealizedGainRecord {
    pub sale_date: NaiveDate,
    pub shares_sold: Money,
    pub sale_price: Money,
    pub proceeds: Money,
    pub cost_basis_of_sold_shares: Money,
    pub gain_loss: Money,
    pub oversold_shares: Money,
    pub lots_consumed: Vec<LotConsumption>,
}

/// Outcome of `FifoLedger::process_sale`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleResult {
    pub shares_sold: Money,
    pub total_proceeds: Money,
    pub total_cost_basis: Money,
    pub realized_gain_loss: Money,
    pub lots_consumed: Vec<LotConsumption>,
    pub remaining_shares: Money,
    /// Requested shares that found no lot to match.
    pub oversold_shares: Money,
}

impl SaleResult {
    pub fn is_oversold(&self) -> bool {
        self.oversold_shares.is_positive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnrealizedGain {
    pub total_shares: Money,
    pub average_cost: Money,
    pub total_cost_basis: Money,
    pub current_price: Money,
    pub market_value: Money,
    pub gain_loss: Money,
    pub gain_loss_pct: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSummary {
    pub total_shares: Money,
    pub total_cost_basis: Money,
    pub average_cost: Money,
    pub lot_count: usize,
    pub realized_sales: usize,
    pub total_realized_gain_loss: Money,
    pub unrealized: Option<UnrealizedGain>,
}

/// Per-security queue of purchase lots, consumed oldest first.
///
/// Transient: rebuilt by replaying the transaction log whenever a position is
/// needed. Lots keep acquisition order and are never reordered.
#[derive(Debug, Clone, Default)]
pub struct FifoLedger {
    lots: VecDeque<Lot>,
    realized: Vec<RealizedGainRecord>,
}

impl FifoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lot. Shares are kept at 4 dp and the price at 2 dp.
    pub fn add_purchase(
        &mut self,
        shares: Money,
        price: Money,
        date: NaiveDate,
    ) -> Result<(), LedgerError> {
        let shares = shares.round_shares();
        let price = price.round_currency();
        if !shares.is_positive() || price.is_negative() {
            return Err(LedgerError::InvalidInput(format!(
                "purchase requires shares > 0 and price >= 0 at 4/2 dp (shares={}, price={})",
                shares, price
            )));
        }

        self.lots.push_back(Lot {
            shares,
            unit_price: price,
            acquired_on: date,
            original_shares: shares,
        });
        Ok(())
    }

    /// Consume lots from the front until the request is met or lots run out.
    ///
    /// Running out is not an error: the matched part is recorded and the rest
    /// is reported as `oversold_shares`.
    pub fn process_sale(
        &mut self,
        shares_to_sell: Money,
        sale_price: Money,
        sale_date: NaiveDate,
    ) -> Result<SaleResult, LedgerError> {
        let sale_price = sale_price.round_currency();
        let mut outstanding = shares_to_sell.round_shares();
        if !outstanding.is_positive() || !sale_price.is_positive() {
            return Err(LedgerError::InvalidInput(format!(
                "sale requires shares > 0 and price > 0 at 4/2 dp (shares={}, price={})",
                outstanding, sale_price
            )));
        }

        let mut shares_sold = Money::zero();
        let mut total_proceeds = Money::zero();
        let mut total_cost_basis = Money::zero();
        let mut lots_consumed = Vec::new();

        while outstanding.is_positive() {
            let Some(front) = self.lots.front_mut() else {
                break;
            };

            let (taken, unit_price, acquired_on) = if front.shares <= outstanding {
                let whole = front.clone();
                self.lots.pop_front();
                (whole.shares, whole.unit_price, whole.acquired_on)
            } else {
                front.shares -= outstanding;
                (outstanding, front.unit_price, front.acquired_on)
            };

            let cost_basis = taken * unit_price;
            let proceeds = taken * sale_price;
            lots_consumed.push(LotConsumption {
                shares: taken,
                unit_price,
                acquired_on,
                cost_basis,
                proceeds,
                gain_loss: proceeds - cost_basis,
            });

            shares_sold += taken;
            total_proceeds += proceeds;
            total_cost_basis += cost_basis;
            outstanding -= taken;
        }

        let realized_gain_loss = total_proceeds - total_cost_basis;
        let oversold_shares = if outstanding.is_positive() {
            outstanding
        } else {
            Money::zero()
        };

        self.realized.push(RealizedGainRecord {
            sale_date,
            shares_sold,
            sale_price,
            proceeds: total_proceeds,
            cost_basis_of_sold_shares: total_cost_basis,
            gain_loss: realized_gain_loss,
            oversold_shares,
            lots_consumed: lots_consumed.clone(),
        });

        Ok(SaleResult {
            shares_sold,
            total_proceeds,
            total_cost_basis,
            realized_gain_loss,
            lots_consumed,
            remaining_shares: self.total_shares(),
            oversold_shares,
        })
    }

    pub fn total_shares(&self) -> Money {
        self.lots.iter().map(|lot| lot.shares).sum()
    }

    pub fn total_cost_basis(&self) -> Money {
        self.lots.iter().map(Lot::cost_basis).sum()
    }

    /// Cost basis per held share at 2 dp; zero when nothing is held.
    pub fn average_cost(&self) -> Money {
        let total_shares = self.total_shares();
        if !total_shares.is_positive() {
            return Money::zero();
        }
        (self.total_cost_basis() / total_shares).round_currency()
    }

    /// `shares * current_price - cost_basis`; zero when nothing is held.
    pub fn unrealized_gain(&self, current_price: Money) -> Money {
        let total_shares = self.total_shares();
        if !total_shares.is_positive() {
            return Money::zero();
        }
        total_shares * current_price.round_currency() - self.total_cost_basis()
    }

    pub fn unrealized(&self, current_price: Money) -> UnrealizedGain {
        let current_price = current_price.round_currency();
        let total_shares = self.total_shares();
        let total_cost_basis = self.total_cost_basis();
        let gain_loss = self.unrealized_gain(current_price);

        UnrealizedGain {
            total_shares,
            average_cost: self.average_cost(),
            total_cost_basis,
            current_price,
            market_value: total_shares * current_price,
            gain_loss,
            gain_loss_pct: gain_loss.percent_of(total_cost_basis),
        }
    }

    pub fn summary(&self, current_price: Option<Money>) -> PositionSummary {
        PositionSummary {
            total_shares: self.total_shares(),
            total_cost_basis: self.total_cost_basis(),
            average_cost: self.average_cost(),
            lot_count: self.lots.len(),
            realized_sales: self.realized.len(),
            total_realized_gain_loss: self.realized.iter().map(|r| r.gain_loss).sum(),
            unrealized: current_price.map(|price| self.unrealized(price)),
        }
    }

    /// Current lots, oldest first.
    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn lot_count(&self) -> usize {
        self.lots.len()
    }

    pub fn realized_gains(&self) -> &[RealizedGainRecord] {
        &self.realized
    }

    /// Drop all lots and realized history.
    pub fn clear(&mut self) {
        self.lots.clear();
        self.realized.clear();
    }
}
