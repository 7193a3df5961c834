//! Risk management: fixed-fractional position sizing and drawdown-aware
//! equity scaling
//!
//! Position sizing formula:
//! ```text
//! risk_amount = effective_equity * risk_fraction
//! risk_per_unit = |entry_price - stop_price|
//! quantity = floor(risk_amount / risk_per_unit)
//! ```
//!
//! All sizing arithmetic runs in `Decimal` so that whole-unit floors and
//! ladder level comparisons are exact. The calculation is
//! currency-agnostic: equity and prices only need to share a denomination.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::StrategyError;

/// Converts an equity snapshot and a stop distance into a whole-unit
/// trade quantity.
///
/// The risk fraction is fixed at construction. Direction is the caller's
/// business; the returned quantity is always non-negative.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    risk_fraction: Decimal,
}

impl PositionSizer {
    pub fn new(risk_fraction: Decimal) -> Self {
        Self { risk_fraction }
    }

    /// Size a new unit against the given stop.
    ///
    /// Fails with [`StrategyError::DivisionUndefined`] when the entry
    /// price equals the stop price. That cannot happen with a positive
    /// volatility estimate, but a zero ATR (a dead market) would produce
    /// an unbounded quantity if left unguarded, so the degenerate case is
    /// an explicit error instead of a silent zero.
    ///
    /// A result of 0 units is a valid outcome (equity too small for one
    /// unit at this risk budget) and the caller is expected to skip the
    /// trade.
    pub fn size(
        &self,
        equity: Decimal,
        price: Decimal,
        stop_price: Decimal,
    ) -> Result<u64, StrategyError> {
        let risk_per_unit = (price - stop_price).abs();
        if risk_per_unit.is_zero() {
            return Err(StrategyError::DivisionUndefined);
        }

        let risk_amount = equity * self.risk_fraction;
        let quantity = (risk_amount / risk_per_unit).floor();

        // Non-positive equity floors to a negative count; trade nothing.
        Ok(quantity.to_u64().unwrap_or(0))
    }

    pub fn risk_fraction(&self) -> Decimal {
        self.risk_fraction
    }
}

/// Effective-equity floor below which the ladder stops descending.
const LADDER_FLOOR: Decimal = dec!(100);

/// Maps actual account equity to the reduced *effective* equity used for
/// sizing during drawdowns.
///
/// Each ladder level steps the actual value down by 10% of the previous
/// effective value while the effective value steps down by 20%, so sizing
/// de-risks twice as fast as the account actually draws down. A new
/// equity peak rebuilds the ladder from that peak.
#[derive(Debug, Clone)]
pub struct DrawdownLadder {
    peak: Decimal,
    levels: Vec<(Decimal, Decimal)>,
}

impl DrawdownLadder {
    pub fn new(starting_equity: Decimal) -> Self {
        let mut ladder = Self {
            peak: starting_equity,
            levels: Vec::new(),
        };
        ladder.rebuild(starting_equity);
        ladder
    }

    /// The effective equity to size against for the given actual equity.
    ///
    /// A value strictly between two levels uses the higher level's
    /// effective value; an exact level match uses its own; anything below
    /// the lowest mapped level uses the lowest.
    pub fn effective(&mut self, current_equity: Decimal) -> Decimal {
        if current_equity > self.peak {
            self.peak = current_equity;
            self.rebuild(current_equity);
            return current_equity;
        }

        let mut previous_effective = match self.levels.first() {
            Some((_, effective)) => *effective,
            None => return current_equity,
        };

        for &(actual, effective) in &self.levels {
            if current_equity > actual {
                return previous_effective;
            }
            if current_equity == actual {
                return effective;
            }
            previous_effective = effective;
        }

        debug!(
            "Equity {} below lowest ladder level, sizing against {}",
            current_equity, previous_effective
        );
        previous_effective
    }

    pub fn peak(&self) -> Decimal {
        self.peak
    }

    fn rebuild(&mut self, starting_equity: Decimal) {
        self.levels.clear();
        let mut actual = starting_equity;
        let mut effective = starting_equity;

        while effective > LADDER_FLOOR {
            self.levels.push((actual, effective));
            actual -= effective * dec!(0.10);
            effective -= effective * dec!(0.20);
        }
    }
}
