//! Backtesting harness
//!
//! A reference implementation of the portfolio/execution side of the
//! engine's boundary plus the sequential loop that drives bars through
//! it. Fills are applied at the observed close with no cost model; the
//! point is to exercise the decision engine end to end, not to model
//! microstructure.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::Config;
use crate::portfolio::PortfolioView;
use crate::strategy::TurtleStrategy;
use crate::types::{
    decimal_from_f64, decimal_to_f64, Candle, Holding, Instruction, PerformanceMetrics, Side,
    Symbol, Trade,
};

// =============================================================================
// Simulated portfolio
// =============================================================================

/// In-memory execution backend for a single instrument.
///
/// Marks to the latest close, fills targets at that mark, and records a
/// [`Trade`] whenever a position returns to flat. Implements
/// [`PortfolioView`] so the engine reads equity, price and holding from
/// it exactly as it would from a live backend.
#[derive(Debug)]
pub struct SimulatedPortfolio {
    symbol: Symbol,
    cash: Decimal,
    position: i64,
    mark_price: Decimal,
    average_entry: Decimal,
    entry_time: Option<DateTime<Utc>>,
    trades: Vec<Trade>,
}

impl SimulatedPortfolio {
    pub fn new(symbol: Symbol, initial_capital: Decimal) -> Self {
        Self {
            symbol,
            cash: initial_capital,
            position: 0,
            mark_price: Decimal::ZERO,
            average_entry: Decimal::ZERO,
            entry_time: None,
            trades: Vec::new(),
        }
    }

    /// Update the mark to the bar's close.
    pub fn mark(&mut self, bar: &Candle) {
        self.mark_price = decimal_from_f64(bar.close);
    }

    /// Realize an instruction at the current mark.
    pub fn apply(&mut self, instruction: &Instruction, time: DateTime<Utc>) {
        match instruction {
            Instruction::NoAction => {}
            Instruction::SetTarget { quantity, .. } => self.fill_to(*quantity, time),
            Instruction::Liquidate { .. } => self.fill_to(0, time),
        }
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    fn fill_to(&mut self, target: i64, time: DateTime<Utc>) {
        if target == self.position {
            return;
        }

        let delta = target - self.position;
        self.cash -= Decimal::from(delta) * self.mark_price;
        debug!(
            "Filling {} from {} to {} at {}",
            self.symbol, self.position, target, self.mark_price
        );

        if self.position == 0 {
            // Opening
            self.average_entry = self.mark_price;
            self.entry_time = Some(time);
        } else if target == 0 {
            // Closing: record the completed round trip
            self.record_trade(time);
            self.average_entry = Decimal::ZERO;
            self.entry_time = None;
        } else if target.signum() == self.position.signum() {
            // Scaling in: volume-weighted average entry
            let held = Decimal::from(self.position.abs());
            let added = Decimal::from(delta.abs());
            self.average_entry = (self.average_entry * held + self.mark_price * added)
                / (held + added);
        }

        self.position = target;
    }

    fn record_trade(&mut self, exit_time: DateTime<Utc>) {
        let quantity = Decimal::from(self.position.abs());
        let side = if self.position > 0 { Side::Buy } else { Side::Sell };
        let pnl = match side {
            Side::Buy => (self.mark_price - self.average_entry) * quantity,
            Side::Sell => (self.average_entry - self.mark_price) * quantity,
        };

        self.trades.push(Trade {
            symbol: self.symbol.clone(),
            side,
            entry_price: self.average_entry,
            exit_price: self.mark_price,
            quantity,
            entry_time: self.entry_time.unwrap_or(exit_time),
            exit_time,
            pnl,
        });
    }
}

impl PortfolioView for SimulatedPortfolio {
    fn current_equity(&self) -> Decimal {
        self.cash + Decimal::from(self.position) * self.mark_price
    }

    fn current_price(&self, _symbol: &Symbol) -> Decimal {
        self.mark_price
    }

    fn current_holding(&self, _symbol: &Symbol) -> Holding {
        match self.position {
            0 => Holding::Flat,
            q if q > 0 => Holding::Long(q as u64),
            q => Holding::Short(q.unsigned_abs()),
        }
    }
}

// =============================================================================
// Backtest driver
// =============================================================================

#[derive(Debug, Default)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    pub metrics: PerformanceMetrics,
}

/// Sequential driving loop: one bar processed to completion before the
/// next is considered.
pub struct Backtester {
    config: Config,
}

impl Backtester {
    pub fn new(config: Config) -> Self {
        Backtester { config }
    }

    pub fn run(&self, candles: &[Candle]) -> Result<BacktestResult> {
        let symbol = self.config.trading.symbol();
        let capital = decimal_from_f64(self.config.trading.initial_capital);

        let mut portfolio = SimulatedPortfolio::new(symbol.clone(), capital);
        let mut strategy = TurtleStrategy::new(symbol, self.config.strategy.clone(), capital)
            .context("Failed to construct strategy")?;

        let mut equity_curve = Vec::with_capacity(candles.len());

        for bar in candles {
            portfolio.mark(bar);
            let instruction = strategy
                .on_bar(bar, &portfolio)
                .context(format!("Strategy failed on bar {}", bar.datetime))?;
            portfolio.apply(&instruction, bar.datetime);
            equity_curve.push((bar.datetime, portfolio.current_equity()));
        }

        let metrics = calculate_metrics(capital, portfolio.trades(), &equity_curve);

        Ok(BacktestResult {
            trades: portfolio.into_trades(),
            equity_curve,
            metrics,
        })
    }
}

fn calculate_metrics(
    initial_capital: Decimal,
    trades: &[Trade],
    equity_curve: &[(DateTime<Utc>, Decimal)],
) -> PerformanceMetrics {
    if equity_curve.is_empty() {
        return PerformanceMetrics::default();
    }

    let final_capital = equity_curve[equity_curve.len() - 1].1;
    let total_return =
        decimal_to_f64((final_capital - initial_capital) / initial_capital) * 100.0;

    let winning: Vec<&Trade> = trades.iter().filter(|t| t.pnl > Decimal::ZERO).collect();
    let losing: Vec<&Trade> = trades.iter().filter(|t| t.pnl <= Decimal::ZERO).collect();

    let win_rate = if trades.is_empty() {
        0.0
    } else {
        (winning.len() as f64 / trades.len() as f64) * 100.0
    };

    let gross_profit: Decimal = winning.iter().map(|t| t.pnl).sum();
    let gross_loss: Decimal = losing.iter().map(|t| t.pnl.abs()).sum();

    let profit_factor = if gross_loss > Decimal::ZERO {
        decimal_to_f64(gross_profit / gross_loss)
    } else if gross_profit > Decimal::ZERO {
        f64::INFINITY
    } else {
        0.0
    };

    let mut peak = initial_capital;
    let mut max_drawdown = 0.0_f64;
    for (_, equity) in equity_curve {
        if *equity > peak {
            peak = *equity;
        }
        if peak > Decimal::ZERO {
            let drawdown = decimal_to_f64((peak - *equity) / peak);
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }

    PerformanceMetrics {
        total_return,
        max_drawdown: max_drawdown * 100.0,
        win_rate,
        profit_factor,
        total_trades: trades.len(),
        winning_trades: winning.len(),
        losing_trades: losing.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn time(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn bar(day: i64, close: f64) -> Candle {
        Candle::new_unchecked(time(day), close, close, close, close, 1000.0)
    }

    #[test]
    fn fills_adjust_cash_and_holding() {
        let mut portfolio = SimulatedPortfolio::new(Symbol::new("AAPL"), dec!(100000));
        portfolio.mark(&bar(0, 100.0));

        portfolio.apply(
            &Instruction::SetTarget {
                symbol: Symbol::new("AAPL"),
                quantity: 100,
            },
            time(0),
        );
        assert_eq!(portfolio.current_holding(&Symbol::new("AAPL")), Holding::Long(100));
        assert_eq!(portfolio.current_equity(), dec!(100000));

        // Mark up 10 points: equity rises with the position
        portfolio.mark(&bar(1, 110.0));
        assert_eq!(portfolio.current_equity(), dec!(101000));
    }

    #[test]
    fn liquidation_records_a_round_trip() {
        let mut portfolio = SimulatedPortfolio::new(Symbol::new("AAPL"), dec!(100000));
        portfolio.mark(&bar(0, 100.0));
        portfolio.apply(
            &Instruction::SetTarget {
                symbol: Symbol::new("AAPL"),
                quantity: 100,
            },
            time(0),
        );

        portfolio.mark(&bar(1, 110.0));
        portfolio.apply(
            &Instruction::Liquidate {
                symbol: Symbol::new("AAPL"),
            },
            time(1),
        );

        assert_eq!(portfolio.current_holding(&Symbol::new("AAPL")), Holding::Flat);
        assert_eq!(portfolio.current_equity(), dec!(101000));
        assert_eq!(portfolio.trades().len(), 1);

        let trade = &portfolio.trades()[0];
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.pnl, dec!(1000));
        assert_eq!(trade.entry_price, dec!(100));
        assert_eq!(trade.exit_price, dec!(110));
    }

    #[test]
    fn short_round_trip_profits_from_falling_prices() {
        let mut portfolio = SimulatedPortfolio::new(Symbol::new("AAPL"), dec!(100000));
        portfolio.mark(&bar(0, 100.0));
        portfolio.apply(
            &Instruction::SetTarget {
                symbol: Symbol::new("AAPL"),
                quantity: -50,
            },
            time(0),
        );
        assert_eq!(
            portfolio.current_holding(&Symbol::new("AAPL")),
            Holding::Short(50)
        );

        portfolio.mark(&bar(1, 90.0));
        assert_eq!(portfolio.current_equity(), dec!(100500));

        portfolio.apply(
            &Instruction::Liquidate {
                symbol: Symbol::new("AAPL"),
            },
            time(1),
        );
        assert_eq!(portfolio.trades()[0].pnl, dec!(500));
        assert_eq!(portfolio.trades()[0].side, Side::Sell);
    }

    #[test]
    fn scaling_in_blends_the_average_entry() {
        let mut portfolio = SimulatedPortfolio::new(Symbol::new("AAPL"), dec!(100000));
        portfolio.mark(&bar(0, 100.0));
        portfolio.apply(
            &Instruction::SetTarget {
                symbol: Symbol::new("AAPL"),
                quantity: 100,
            },
            time(0),
        );

        portfolio.mark(&bar(1, 110.0));
        portfolio.apply(
            &Instruction::SetTarget {
                symbol: Symbol::new("AAPL"),
                quantity: 200,
            },
            time(1),
        );

        // 100 @ 100 plus 100 @ 110 averages to 105
        assert_eq!(portfolio.average_entry, dec!(105));

        portfolio.mark(&bar(2, 120.0));
        portfolio.apply(
            &Instruction::Liquidate {
                symbol: Symbol::new("AAPL"),
            },
            time(2),
        );
        assert_eq!(portfolio.trades()[0].pnl, dec!(3000));
        assert_eq!(portfolio.trades()[0].quantity, dec!(200));
    }

    #[test]
    fn no_action_changes_nothing() {
        let mut portfolio = SimulatedPortfolio::new(Symbol::new("AAPL"), dec!(100000));
        portfolio.mark(&bar(0, 100.0));
        portfolio.apply(&Instruction::NoAction, time(0));
        assert_eq!(portfolio.current_equity(), dec!(100000));
        assert_eq!(portfolio.current_holding(&Symbol::new("AAPL")), Holding::Flat);
        assert!(portfolio.trades().is_empty());
    }

    #[test]
    fn metrics_summarize_the_run() {
        let trades = vec![
            Trade {
                symbol: Symbol::new("AAPL"),
                side: Side::Buy,
                entry_price: dec!(100),
                exit_price: dec!(110),
                quantity: dec!(10),
                entry_time: time(0),
                exit_time: time(1),
                pnl: dec!(100),
            },
            Trade {
                symbol: Symbol::new("AAPL"),
                side: Side::Buy,
                entry_price: dec!(110),
                exit_price: dec!(105),
                quantity: dec!(10),
                entry_time: time(2),
                exit_time: time(3),
                pnl: dec!(-50),
            },
        ];
        let equity_curve = vec![
            (time(0), dec!(100000)),
            (time(1), dec!(100100)),
            (time(2), dec!(100100)),
            (time(3), dec!(100050)),
        ];

        let metrics = calculate_metrics(dec!(100000), &trades, &equity_curve);
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.winning_trades, 1);
        assert_eq!(metrics.losing_trades, 1);
        assert_eq!(metrics.win_rate, 50.0);
        assert_eq!(metrics.profit_factor, 2.0);
        assert!(metrics.total_return > 0.0);
        assert!(metrics.max_drawdown > 0.0);
    }
}
