//! Donchian channel: highest high and lowest low over a lookback window

use crate::types::{Candle, StrategyError};

use super::rolling::RollingExtremum;

/// Price channel formed by the highest high and lowest low of the last
/// `period` bars.
///
/// The strategy runs two of these at different periods, one for entries
/// and one for exits. Both are updated on every bar whether or not a
/// position is open, so a breakout is detectable on the exact bar the
/// boundary is crossed.
#[derive(Debug, Clone)]
pub struct DonchianChannel {
    period: usize,
    highs: RollingExtremum,
    lows: RollingExtremum,
}

impl DonchianChannel {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            highs: RollingExtremum::max(period),
            lows: RollingExtremum::min(period),
        }
    }

    /// Feed the bar's high into the high tracker and its low into the low
    /// tracker.
    pub fn update(&mut self, bar: &Candle) {
        self.highs.update(bar.high);
        self.lows.update(bar.low);
    }

    pub fn is_ready(&self) -> bool {
        self.highs.is_ready() && self.lows.is_ready()
    }

    /// Highest high over the window.
    pub fn upper(&self) -> Result<f64, StrategyError> {
        self.check_ready()?;
        self.highs.current()
    }

    /// Lowest low over the window.
    pub fn lower(&self) -> Result<f64, StrategyError> {
        self.check_ready()?;
        self.lows.current()
    }

    /// Midpoint between the bands.
    pub fn midpoint(&self) -> Result<f64, StrategyError> {
        Ok((self.upper()? + self.lower()?) / 2.0)
    }

    pub fn period(&self) -> usize {
        self.period
    }

    fn check_ready(&self) -> Result<(), StrategyError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(StrategyError::NotReady("donchian_channel"))
        }
    }
}
