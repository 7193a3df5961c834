//! Turtle strategy runner - main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use turtle_strategy::backtest::Backtester;
use turtle_strategy::config::Config;
use turtle_strategy::data;

#[derive(Parser, Debug)]
#[command(name = "turtle-strategy")]
#[command(about = "Turtle-style channel breakout trading strategy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a backtest over a CSV bar file
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/turtle_1d.json")]
        config: String,

        /// Bar file (overrides <data_dir>/<SYMBOL>_<timeframe>.csv)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Initial capital (overrides config file)
        #[arg(long)]
        capital: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Backtest {
            config,
            data,
            capital,
        } => run_backtest(&config, data, capital),
    }
}

fn run_backtest(config_path: &str, data: Option<PathBuf>, capital: Option<f64>) -> Result<()> {
    let mut config = Config::from_file(config_path)?;
    if let Some(capital) = capital {
        config.trading.initial_capital = capital;
    }
    config.validate()?;

    let data_path = data.unwrap_or_else(|| {
        Path::new(&config.backtest.data_dir).join(format!(
            "{}_{}.csv",
            config.trading.symbol, config.backtest.timeframe
        ))
    });

    let candles = data::load_csv(&data_path)?;
    info!(
        "Backtesting {} over {} bars",
        config.trading.symbol,
        candles.len()
    );

    let result = Backtester::new(config).run(&candles)?;

    let metrics = &result.metrics;
    info!("===== Backtest Summary =====");
    info!("Total return:    {:.2}%", metrics.total_return);
    info!("Max drawdown:    {:.2}%", metrics.max_drawdown);
    info!("Trades:          {}", metrics.total_trades);
    info!(
        "Win rate:        {:.1}% ({} wins / {} losses)",
        metrics.win_rate, metrics.winning_trades, metrics.losing_trades
    );
    info!("Profit factor:   {:.2}", metrics.profit_factor);
    if let Some((when, equity)) = result.equity_curve.last() {
        info!("Final equity:    {} at {}", equity, when);
    }

    Ok(())
}
