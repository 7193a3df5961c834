//! Configuration management
//!
//! JSON configuration files parsed with serde. Every strategy parameter
//! carries a default matching the classic settings, so a minimal config
//! only needs to name the instrument.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::types::Symbol;

/// Configuration values that fail validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1")]
    ZeroPeriod { name: &'static str },

    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("risk_fraction must lie in (0, 1), got {0}")]
    RiskFraction(f64),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub trading: TradingConfig,
    #[serde(default)]
    pub strategy: TurtleConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load configuration from a JSON file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trading.validate()?;
        self.strategy.validate()
    }
}

/// Account-level settings
///
/// Currency-agnostic: `initial_capital` only needs to share a
/// denomination with the price data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub symbol: String,
    pub initial_capital: f64,
}

impl TradingConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "initial_capital",
                value: self.initial_capital,
            });
        }
        Ok(())
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbol: "AAPL".to_string(),
            initial_capital: 1_000_000.0,
        }
    }
}

/// Turtle strategy parameters
///
/// Read once at construction and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurtleConfig {
    /// Donchian lookback for entry breakouts (default: 20)
    #[serde(default = "default_entry_period")]
    pub entry_period: usize,

    /// Donchian lookback for exit breakouts (default: 10)
    #[serde(default = "default_exit_period")]
    pub exit_period: usize,

    /// ATR period for the volatility estimate (default: 14)
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// Stop distance in ATR multiples (default: 2.0)
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: f64,

    /// Fraction of effective equity risked per unit (default: 0.01)
    #[serde(default = "default_risk_fraction")]
    pub risk_fraction: f64,

    /// Maximum units held in one position (default: 4)
    #[serde(default = "default_max_pyramid_levels")]
    pub max_pyramid_levels: u32,

    /// Favorable move, in ATRs, that earns an added unit (default: 1.0)
    #[serde(default = "default_pyramid_step_atr")]
    pub pyramid_step_atr: f64,
}

fn default_entry_period() -> usize {
    20
}
fn default_exit_period() -> usize {
    10
}
fn default_atr_period() -> usize {
    14
}
fn default_atr_multiplier() -> f64 {
    2.0
}
fn default_risk_fraction() -> f64 {
    0.01
}
fn default_max_pyramid_levels() -> u32 {
    4
}
fn default_pyramid_step_atr() -> f64 {
    1.0
}

impl Default for TurtleConfig {
    fn default() -> Self {
        Self {
            entry_period: 20,
            exit_period: 10,
            atr_period: 14,
            atr_multiplier: 2.0,
            risk_fraction: 0.01,
            max_pyramid_levels: 4,
            pyramid_step_atr: 1.0,
        }
    }
}

impl TurtleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_period < 1 {
            return Err(ConfigError::ZeroPeriod {
                name: "entry_period",
            });
        }
        if self.exit_period < 1 {
            return Err(ConfigError::ZeroPeriod { name: "exit_period" });
        }
        if self.atr_period < 1 {
            return Err(ConfigError::ZeroPeriod { name: "atr_period" });
        }
        if self.max_pyramid_levels < 1 {
            return Err(ConfigError::ZeroPeriod {
                name: "max_pyramid_levels",
            });
        }
        if !self.atr_multiplier.is_finite() || self.atr_multiplier <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "atr_multiplier",
                value: self.atr_multiplier,
            });
        }
        if !self.pyramid_step_atr.is_finite() || self.pyramid_step_atr <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "pyramid_step_atr",
                value: self.pyramid_step_atr,
            });
        }
        if !self.risk_fraction.is_finite() || self.risk_fraction <= 0.0 || self.risk_fraction >= 1.0
        {
            return Err(ConfigError::RiskFraction(self.risk_fraction));
        }
        Ok(())
    }

    /// Bars required before every indicator is ready.
    pub fn warmup_bars(&self) -> usize {
        self.entry_period.max(self.exit_period).max(self.atr_period)
    }
}

/// Backtest driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Directory holding `<SYMBOL>_<timeframe>.csv` bar files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Bar timeframe label used in data file names (default: 1d)
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}
fn default_timeframe() -> String {
    "1d".to_string()
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            timeframe: "1d".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_settings() {
        let config = TurtleConfig::default();
        assert_eq!(config.entry_period, 20);
        assert_eq!(config.exit_period, 10);
        assert_eq!(config.atr_period, 14);
        assert_eq!(config.atr_multiplier, 2.0);
        assert_eq!(config.risk_fraction, 0.01);
        assert_eq!(config.max_pyramid_levels, 4);
        assert_eq!(config.pyramid_step_atr, 1.0);
        assert_eq!(config.warmup_bars(), 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn minimal_json_fills_in_defaults() {
        let json = r#"{ "trading": { "symbol": "AAPL", "initial_capital": 1000000 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy.entry_period, 20);
        assert_eq!(config.backtest.data_dir, "data");
        assert_eq!(config.trading.symbol().as_str(), "AAPL");
    }

    #[test]
    fn partial_strategy_section_overrides_only_named_fields() {
        let json = r#"{
            "trading": { "symbol": "AAPL", "initial_capital": 1000000 },
            "strategy": { "entry_period": 55, "exit_period": 20, "risk_fraction": 0.02 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.strategy.entry_period, 55);
        assert_eq!(config.strategy.exit_period, 20);
        assert_eq!(config.strategy.risk_fraction, 0.02);
        assert_eq!(config.strategy.atr_period, 14);
    }

    #[test]
    fn zero_period_rejected() {
        let config = TurtleConfig {
            entry_period: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroPeriod {
                name: "entry_period"
            })
        ));
    }

    #[test]
    fn out_of_range_risk_fraction_rejected() {
        for bad in [0.0, 1.0, -0.5, f64::NAN] {
            let config = TurtleConfig {
                risk_fraction: bad,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::RiskFraction(_))
            ));
        }
    }

    #[test]
    fn non_positive_capital_rejected() {
        let config = Config {
            trading: TradingConfig {
                symbol: "AAPL".into(),
                initial_capital: 0.0,
            },
            strategy: TurtleConfig::default(),
            backtest: BacktestConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_multiplier_rejected() {
        let config = TurtleConfig {
            atr_multiplier: -2.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                name: "atr_multiplier",
                ..
            })
        ));
    }
}
