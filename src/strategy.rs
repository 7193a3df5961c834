//! Turtle channel breakout strategy
//!
//! Entry: close breaks the entry-channel band (highest high / lowest low
//! of the entry lookback). Exit: close breaks the opposite exit-channel
//! band, or the protective stop placed `atr_multiplier` ATRs away from
//! the latest entry. Scaling: up to `max_pyramid_levels` units, adding
//! one whenever price moves `pyramid_step_atr` ATRs further in the
//! position's favor, with the stop re-anchored on every add.
//!
//! One engine instance drives exactly one instrument. The engine owns its
//! indicator state and trade bookkeeping; the settled position itself
//! belongs to the execution backend and is re-read every bar.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, TurtleConfig};
use crate::indicators::{AverageTrueRange, DonchianChannel};
use crate::portfolio::PortfolioView;
use crate::risk::{DrawdownLadder, PositionSizer};
use crate::types::{decimal_from_f64, Candle, Holding, Instruction, Side, StrategyError, Symbol};

/// Bookkeeping for the position the engine has asked the backend to hold.
#[derive(Debug, Clone)]
struct PositionLog {
    stop_price: Decimal,
    entry_prices: Vec<Decimal>,
    pyramid_level: u32,
    last_add_price: Decimal,
}

/// Per-bar decision engine for a single instrument.
pub struct TurtleStrategy {
    symbol: Symbol,
    config: TurtleConfig,
    entry_channel: DonchianChannel,
    exit_channel: DonchianChannel,
    atr: AverageTrueRange,
    sizer: PositionSizer,
    ladder: DrawdownLadder,
    last_bar_time: Option<DateTime<Utc>>,
    position_log: Option<PositionLog>,
}

impl TurtleStrategy {
    /// Build an engine for one instrument.
    ///
    /// `starting_equity` seeds the drawdown ladder, mirroring the account
    /// value at strategy start.
    pub fn new(
        symbol: Symbol,
        config: TurtleConfig,
        starting_equity: Decimal,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            entry_channel: DonchianChannel::new(config.entry_period),
            exit_channel: DonchianChannel::new(config.exit_period),
            atr: AverageTrueRange::new(config.atr_period),
            sizer: PositionSizer::new(decimal_from_f64(config.risk_fraction)),
            ladder: DrawdownLadder::new(starting_equity),
            last_bar_time: None,
            position_log: None,
            symbol,
            config,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn config(&self) -> &TurtleConfig {
        &self.config
    }

    /// True once the entry channel, exit channel and ATR all have enough
    /// history to be read.
    pub fn is_ready(&self) -> bool {
        self.entry_channel.is_ready() && self.exit_channel.is_ready() && self.atr.is_ready()
    }

    /// Process one bar and emit exactly one instruction.
    ///
    /// Evaluation order per bar: ordering guard, indicator updates,
    /// readiness gate, bookkeeping reconciliation, then the state
    /// machine. During warm-up the bar only feeds the indicators and the
    /// result is always `NoAction`.
    pub fn on_bar(
        &mut self,
        bar: &Candle,
        portfolio: &dyn PortfolioView,
    ) -> Result<Instruction, StrategyError> {
        if let Some(previous) = self.last_bar_time {
            if bar.datetime <= previous {
                return Err(StrategyError::OutOfOrderData {
                    previous,
                    current: bar.datetime,
                });
            }
        }
        self.last_bar_time = Some(bar.datetime);

        self.entry_channel.update(bar);
        self.exit_channel.update(bar);
        self.atr.update(bar);

        if !self.is_ready() {
            debug!("Indicators warming up for {}", self.symbol);
            return Ok(Instruction::NoAction);
        }

        let holding = portfolio.current_holding(&self.symbol);

        // Reconcile bookkeeping with whatever the backend settled on.
        match holding {
            Holding::Flat => {
                if self.position_log.take().is_some() {
                    debug!("Backend reports {} flat, clearing position log", self.symbol);
                }
            }
            _ if self.position_log.is_none() => {
                // A position without a protective stop must not ride on.
                error!("Position in {} held without a stop, liquidating", self.symbol);
                return Ok(self.liquidate_instruction());
            }
            _ => {}
        }

        match holding {
            Holding::Flat => self.evaluate_entry(bar.close, portfolio),
            Holding::Long(held) => self.manage_long(bar.close, held, portfolio),
            Holding::Short(held) => self.manage_short(bar.close, held, portfolio),
        }
    }

    fn evaluate_entry(
        &mut self,
        close: f64,
        portfolio: &dyn PortfolioView,
    ) -> Result<Instruction, StrategyError> {
        let upper = self.entry_channel.upper()?;
        let lower = self.entry_channel.lower()?;

        // The long check runs first, so a degenerate zero-width channel
        // opens long.
        if close >= upper {
            self.open_position(Side::Buy, portfolio)
        } else if close <= lower {
            self.open_position(Side::Sell, portfolio)
        } else {
            Ok(Instruction::NoAction)
        }
    }

    fn manage_long(
        &mut self,
        close: f64,
        held: u64,
        portfolio: &dyn PortfolioView,
    ) -> Result<Instruction, StrategyError> {
        let exit_lower = self.exit_channel.lower()?;
        if close <= exit_lower {
            info!(
                "Exiting long {}: close {} breached exit channel {}",
                self.symbol, close, exit_lower
            );
            return Ok(self.liquidate_instruction());
        }

        let (stop_price, pyramid_level, last_add_price) = match &self.position_log {
            Some(log) => (log.stop_price, log.pyramid_level, log.last_add_price),
            None => return Ok(self.liquidate_instruction()),
        };

        let close_dec = decimal_from_f64(close);
        if close_dec <= stop_price {
            info!(
                "Exiting long {}: close {} hit stop {}",
                self.symbol, close, stop_price
            );
            return Ok(self.liquidate_instruction());
        }

        if pyramid_level < self.config.max_pyramid_levels {
            let step = decimal_from_f64(self.atr.current()? * self.config.pyramid_step_atr);
            if close_dec >= last_add_price + step {
                return self.add_unit(Side::Buy, held, portfolio);
            }
        }

        Ok(Instruction::NoAction)
    }

    fn manage_short(
        &mut self,
        close: f64,
        held: u64,
        portfolio: &dyn PortfolioView,
    ) -> Result<Instruction, StrategyError> {
        let exit_upper = self.exit_channel.upper()?;
        if close >= exit_upper {
            info!(
                "Exiting short {}: close {} breached exit channel {}",
                self.symbol, close, exit_upper
            );
            return Ok(self.liquidate_instruction());
        }

        let (stop_price, pyramid_level, last_add_price) = match &self.position_log {
            Some(log) => (log.stop_price, log.pyramid_level, log.last_add_price),
            None => return Ok(self.liquidate_instruction()),
        };

        let close_dec = decimal_from_f64(close);
        if close_dec >= stop_price {
            info!(
                "Exiting short {}: close {} hit stop {}",
                self.symbol, close, stop_price
            );
            return Ok(self.liquidate_instruction());
        }

        if pyramid_level < self.config.max_pyramid_levels {
            let step = decimal_from_f64(self.atr.current()? * self.config.pyramid_step_atr);
            if close_dec <= last_add_price - step {
                return self.add_unit(Side::Sell, held, portfolio);
            }
        }

        Ok(Instruction::NoAction)
    }

    fn open_position(
        &mut self,
        side: Side,
        portfolio: &dyn PortfolioView,
    ) -> Result<Instruction, StrategyError> {
        // Latest snapshot from the backend, not values cached earlier in
        // the bar.
        let price = portfolio.current_price(&self.symbol);
        let stop_price = self.stop_for(side, price)?;
        let equity = self.ladder.effective(portfolio.current_equity());

        let quantity = match self.sized_quantity(equity, price, stop_price) {
            Some(q) => q,
            None => return Ok(Instruction::NoAction),
        };

        self.position_log = Some(PositionLog {
            stop_price,
            entry_prices: vec![price],
            pyramid_level: 1,
            last_add_price: price,
        });

        let target = match side {
            Side::Buy => quantity as i64,
            Side::Sell => -(quantity as i64),
        };
        info!(
            "Entering {:?} {}: quantity {}, price {}, stop {}",
            side, self.symbol, quantity, price, stop_price
        );
        Ok(Instruction::SetTarget {
            symbol: self.symbol.clone(),
            quantity: target,
        })
    }

    fn add_unit(
        &mut self,
        side: Side,
        held: u64,
        portfolio: &dyn PortfolioView,
    ) -> Result<Instruction, StrategyError> {
        let price = portfolio.current_price(&self.symbol);
        let stop_price = self.stop_for(side, price)?;
        let equity = self.ladder.effective(portfolio.current_equity());

        let quantity = match self.sized_quantity(equity, price, stop_price) {
            Some(q) => q,
            None => return Ok(Instruction::NoAction),
        };

        let pyramid_level = match self.position_log.as_mut() {
            Some(log) => {
                log.entry_prices.push(price);
                log.last_add_price = price;
                log.pyramid_level += 1;
                // The stop trails the whole position to the latest unit.
                log.stop_price = stop_price;
                log.pyramid_level
            }
            None => return Ok(self.liquidate_instruction()),
        };

        let target = match side {
            Side::Buy => held as i64 + quantity as i64,
            Side::Sell => -(held as i64) - quantity as i64,
        };
        info!(
            "Adding to {:?} {}: pyramid level {}, quantity {}, price {}, stop {}",
            side, self.symbol, pyramid_level, quantity, price, stop_price
        );
        Ok(Instruction::SetTarget {
            symbol: self.symbol.clone(),
            quantity: target,
        })
    }

    /// Protective stop `atr_multiplier` ATRs against the position.
    fn stop_for(&self, side: Side, price: Decimal) -> Result<Decimal, StrategyError> {
        let offset = decimal_from_f64(self.atr.current()? * self.config.atr_multiplier);
        Ok(match side {
            Side::Buy => price - offset,
            Side::Sell => price + offset,
        })
    }

    /// Run the sizer, translating its two reject outcomes into "skip this
    /// trade": a degenerate zero stop distance and an equity too small
    /// for a single unit. Both leave the engine flat-handed for the bar.
    fn sized_quantity(&self, equity: Decimal, price: Decimal, stop_price: Decimal) -> Option<u64> {
        match self.sizer.size(equity, price, stop_price) {
            Ok(0) => {
                debug!(
                    "Sized {} to zero units at equity {}, skipping trade",
                    self.symbol, equity
                );
                None
            }
            Ok(quantity) => Some(quantity),
            Err(StrategyError::DivisionUndefined) => {
                warn!(
                    "Price {} equals stop for {}, rejecting trade",
                    price, self.symbol
                );
                None
            }
            Err(err) => {
                warn!("Sizing failed for {}: {}, rejecting trade", self.symbol, err);
                None
            }
        }
    }

    fn liquidate_instruction(&mut self) -> Instruction {
        if let Some(log) = self.position_log.take() {
            debug!(
                "Closing {} after {} unit(s)",
                self.symbol,
                log.entry_prices.len()
            );
        }
        Instruction::Liquidate {
            symbol: self.symbol.clone(),
        }
    }
}
