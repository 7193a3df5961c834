//! Average True Range over a simple moving average
//!
//! True Range for a bar:
//!   TR = max(high - low, |high - prev_close|, |low - prev_close|)
//!
//! The very first bar has no previous close, so its TR is just high - low.
//! The ATR here is the plain mean of the last `period` TR samples, which
//! keeps the stop distance responsive to the recent window rather than an
//! infinite-memory smooth.

use std::collections::VecDeque;

use crate::types::{Candle, StrategyError};

/// Volatility estimate driving stop placement and position sizing.
#[derive(Debug, Clone)]
pub struct AverageTrueRange {
    period: usize,
    prev_close: Option<f64>,
    window: VecDeque<f64>,
}

impl AverageTrueRange {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "period must be >= 1");
        Self {
            period,
            prev_close: None,
            window: VecDeque::with_capacity(period),
        }
    }

    /// Fold the bar's true range into the window, then remember its close
    /// for the next bar's range calculation.
    pub fn update(&mut self, bar: &Candle) {
        let true_range = match self.prev_close {
            Some(pc) => {
                let high_low = bar.high - bar.low;
                let high_prev = (bar.high - pc).abs();
                let low_prev = (bar.low - pc).abs();
                high_low.max(high_prev).max(low_prev)
            }
            None => bar.high - bar.low,
        };

        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back(true_range);
        self.prev_close = Some(bar.close);
    }

    /// True once `period` true-range samples have been folded in.
    pub fn is_ready(&self) -> bool {
        self.window.len() == self.period
    }

    /// Mean true range over the window.
    pub fn current(&self) -> Result<f64, StrategyError> {
        if !self.is_ready() {
            return Err(StrategyError::NotReady("average_true_range"));
        }
        let sum: f64 = self.window.iter().sum();
        Ok(sum / self.period as f64)
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(day: i64, high: f64, low: f64, close: f64) -> Candle {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle::new_unchecked(start + Duration::days(day), close, high, low, close, 1000.0)
    }

    #[test]
    fn first_bar_uses_high_minus_low() {
        let mut atr = AverageTrueRange::new(1);
        atr.update(&bar(0, 105.0, 95.0, 102.0));
        assert_eq!(atr.current(), Ok(10.0));
    }

    #[test]
    fn not_ready_before_period_samples() {
        let mut atr = AverageTrueRange::new(3);
        atr.update(&bar(0, 105.0, 95.0, 102.0));
        atr.update(&bar(1, 108.0, 100.0, 106.0));
        assert!(!atr.is_ready());
        assert_eq!(
            atr.current(),
            Err(StrategyError::NotReady("average_true_range"))
        );

        atr.update(&bar(2, 107.0, 98.0, 99.0));
        assert!(atr.is_ready());
    }

    #[test]
    fn equals_mean_of_recent_true_ranges() {
        let mut atr = AverageTrueRange::new(3);
        // TR: 10 (first bar), 8, 9, 6 per the documented formula
        atr.update(&bar(0, 105.0, 95.0, 102.0));
        atr.update(&bar(1, 108.0, 100.0, 106.0));
        atr.update(&bar(2, 107.0, 98.0, 99.0));
        assert_relative_eq!(atr.current().unwrap(), (10.0 + 8.0 + 9.0) / 3.0);

        // The first sample falls out of the window
        atr.update(&bar(3, 103.0, 97.0, 101.0));
        assert_relative_eq!(atr.current().unwrap(), (8.0 + 9.0 + 6.0) / 3.0);
    }

    #[test]
    fn gap_against_previous_close_dominates() {
        let mut atr = AverageTrueRange::new(1);
        atr.update(&bar(0, 102.0, 97.0, 100.0));
        // Gap up: |115 - 100| = 15 beats the bar's own 7-point range
        atr.update(&bar(1, 115.0, 108.0, 112.0));
        assert_eq!(atr.current(), Ok(15.0));
    }

    #[test]
    fn flat_bars_give_zero_range() {
        let mut atr = AverageTrueRange::new(2);
        atr.update(&bar(0, 100.0, 100.0, 100.0));
        atr.update(&bar(1, 100.0, 100.0, 100.0));
        assert_eq!(atr.current(), Ok(0.0));
    }

    #[test]
    #[should_panic(expected = "period must be >= 1")]
    fn zero_period_rejected() {
        AverageTrueRange::new(0);
    }
}
