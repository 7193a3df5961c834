//! Core data types used across the strategy engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strategy-level failures surfaced to the driving loop.
///
/// All three are local, synchronous conditions with nothing to retry
/// against. The driving loop decides whether to abort the run or skip
/// the offending bar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// An indicator was queried before its warm-up window filled.
    ///
    /// Callers must check `is_ready()` before reading; hitting this is a
    /// programming error, not a recoverable market condition.
    #[error("indicator `{0}` queried before warm-up completed")]
    NotReady(&'static str),

    /// Entry price and stop price coincide, so risk per unit is zero and
    /// the position size is undefined.
    #[error("stop distance is zero, position size is undefined")]
    DivisionUndefined,

    /// A bar arrived with a timestamp at or before the previous bar.
    ///
    /// The bar is rejected before it can corrupt any rolling window.
    #[error("bar at {current} does not advance past previous bar at {previous}")]
    OutOfOrderData {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data, one per market update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (for trusted sources)
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Check validity without the detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Instrument symbol using Arc<str> for cheap cloning
///
/// Symbols travel with every instruction and trade record, so cloning
/// must not allocate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(std::sync::Arc<str>);

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Symbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Symbol::new(s))
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Position state as settled by the execution backend.
///
/// The backend owns this; the engine only reads it before deciding and
/// never assumes an emitted target has already been filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Holding {
    Flat,
    Long(u64),
    Short(u64),
}

impl Holding {
    pub fn is_invested(&self) -> bool {
        !matches!(self, Holding::Flat)
    }

    /// Held quantity with sign: positive long, negative short, zero flat.
    pub fn signed_quantity(&self) -> i64 {
        match self {
            Holding::Flat => 0,
            Holding::Long(q) => *q as i64,
            Holding::Short(q) => -(*q as i64),
        }
    }
}

/// Position-target instruction emitted by the engine, at most one per bar.
///
/// The execution backend translates targets into orders and fills; the
/// engine learns the outcome through `Holding` on the next bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Bring the holding to the given signed quantity (positive = long,
    /// negative = short).
    SetTarget { symbol: Symbol, quantity: i64 },

    /// Close out the entire holding.
    Liquidate { symbol: Symbol },

    /// Nothing to do this bar.
    NoAction,
}

/// Completed round trip recorded by the simulated backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl: Decimal,
}

impl Trade {
    /// Return percentage relative to the entry price
    pub fn return_pct(&self) -> f64 {
        if self.entry_price.is_zero() {
            return 0.0;
        }
        let pct = match self.side {
            Side::Buy => (self.exit_price - self.entry_price) / self.entry_price,
            Side::Sell => (self.entry_price - self.exit_price) / self.entry_price,
        };
        decimal_to_f64(pct) * 100.0
    }
}

/// Backtest summary statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
}

/// Convert an f64 into a Decimal, mapping non-finite values to zero.
///
/// Indicator math runs in f64; everything monetary runs in Decimal. This
/// is the single crossing point between the two.
pub fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
}

/// Convert a Decimal back to f64 for reporting-side arithmetic.
pub fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}
