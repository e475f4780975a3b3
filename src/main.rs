//! CLI entrypoint: parses config, builds a `GridBot` against either a
//! paper or backtest exchange, and runs it to completion. No live
//! trading binary ships here, that needs the out-of-scope real
//! exchange client (spec §1 Non-goals).

use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use rust_decimal::Decimal;

use grid_trading_engine::config::loader::ConfigLoader;
use grid_trading_engine::config::TradingMode;
use grid_trading_engine::exchange::{BacktestExchange, Exchange, PaperExchange};
use grid_trading_engine::prelude::GridBot;

#[derive(Parser, Debug)]
#[command(name = "grid-trading-engine", about = "Grid trading engine core")]
struct Args {
    /// Path to a TOML config file (without extension), e.g. `config/bot`.
    #[arg(short, long, default_value = "config/bot")]
    config: String,

    /// Optional `.env` file to load before reading environment overrides.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Number of ticks to run a paper-trading session for (ignored in backtest mode).
    #[arg(long, default_value_t = 100)]
    ticks: u32,

    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    grid_trading_engine::init_logging();

    let config = ConfigLoader::new()
        .with_env_file(&args.env_file)
        .with_file(&args.config)
        .with_environment()
        .build()?;

    info!("starting bot {} in {:?} mode", config.bot_id, config.trading_mode);

    match config.trading_mode {
        TradingMode::Backtest => run_backtest(config).await,
        TradingMode::PaperTrading => run_paper(config, args.ticks).await,
        TradingMode::Live => {
            error!("live trading requires the real exchange client, which this build does not include");
            Err(anyhow::anyhow!("live trading mode is unsupported by this binary"))
        }
    }
}

async fn run_paper(config: grid_trading_engine::config::Config, ticks: u32) -> anyhow::Result<()> {
    let starting_price = (config.bottom_range + config.top_range) / Decimal::from(2);
    let exchange: Arc<dyn Exchange> = Arc::new(PaperExchange::new(
        config.investment_amount,
        Decimal::ZERO,
        starting_price,
    ));

    let bot = GridBot::build_with_default_bus(config, exchange.clone()).await?;
    let mut strategy = bot.strategy;
    strategy.initialize_strategy(starting_price).await?;

    let mut price = starting_price;
    for _ in 0..ticks {
        if !strategy.is_running() {
            break;
        }
        // Without a real feed this walks a flat series; a future live
        // binary would source ticks from `Exchange::stream_ticks`.
        let filled = Vec::new();
        strategy.on_ticker_update(price, filled).await?;
        price = strategy_price_drift(price);
    }

    if let Some(summary) = strategy.performance_summary() {
        info!(
            "paper run complete: return={}% drawdown={}% fees={}",
            summary.total_return_pct, summary.max_drawdown_pct, summary.total_fees
        );
    }
    Ok(())
}

async fn run_backtest(config: grid_trading_engine::config::Config) -> anyhow::Result<()> {
    // A real binary would load candles from storage/a feed; this keeps
    // the driver's shape without pulling in the out-of-scope data layer.
    let candles = Vec::new();
    let starting_price = (config.bottom_range + config.top_range) / Decimal::from(2);
    let backtest_exchange = Arc::new(BacktestExchange::new(
        candles,
        config.investment_amount,
        Decimal::ZERO,
    ));

    let bot = GridBot::build_with_default_bus(config, backtest_exchange.clone()).await?;
    let mut strategy = bot.strategy;
    strategy.initialize_strategy(starting_price).await?;
    strategy.run_backtest(&backtest_exchange).await?;

    if let Some(summary) = strategy.performance_summary() {
        info!(
            "backtest complete over {} candles: return={}%",
            backtest_exchange.candle_count(),
            summary.total_return_pct
        );
    }
    Ok(())
}

fn strategy_price_drift(price: Decimal) -> Decimal {
    price
}
