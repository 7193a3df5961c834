//! Streaming technical indicators
//!
//! Each indicator is a plain struct fed one bar (or value) at a time with
//! a fixed period chosen at construction. They warm up monotonically:
//! `is_ready()` flips to true once enough history has arrived and stays
//! true for the rest of the run. Reading a value before that fails with
//! [`StrategyError::NotReady`](crate::types::StrategyError) rather than
//! returning a placeholder.

mod atr;
mod donchian;
mod rolling;

pub use atr::AverageTrueRange;
pub use donchian::DonchianChannel;
pub use rolling::{Extremum, RollingExtremum};
