//! Demo backtest: two synthetic instruments, a moving-average crossover on
//! one of them, mock broker fills, full portfolio accounting.
//!
//! Control log output with `RUST_LOG` (e.g. `RUST_LOG=debug`).

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sm_data::{generate_bars, BacktestStream, DataManager, SyntheticConfig};
use sm_engine::{
    attach_strategy, BrokerSim, Engine, MovingAverageCrossover, NoCommission, OrderManager,
    Portfolio, RiskManager,
};
use sm_types::Timeframe;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let engine = Engine::new();
    let portfolio = Portfolio::attach(&engine);
    RiskManager::attach(&engine);
    OrderManager::attach(&engine);
    BrokerSim::attach(&engine, NoCommission);

    let alpha = BacktestStream::new(
        engine.bus(),
        engine.store(),
        "ALPHA",
        Timeframe::H1,
        generate_bars(&SyntheticConfig {
            bars: 1_200,
            seed: 7,
            volatility: 0.02,
            ..SyntheticConfig::default()
        }),
    )?;
    let beta = BacktestStream::new(
        engine.bus(),
        engine.store(),
        "BETA",
        Timeframe::H4,
        generate_bars(&SyntheticConfig {
            bars: 300,
            seed: 11,
            timeframe: Timeframe::H4,
            start_price: 250.0,
            ..SyntheticConfig::default()
        }),
    )?;

    attach_strategy(
        &engine,
        "ALPHA",
        Timeframe::H1,
        MovingAverageCrossover::new(50, 200),
    );

    let mut manager = DataManager::new(
        engine.bus().clone(),
        engine.store().clone(),
        vec![Box::new(alpha), Box::new(beta)],
    );
    let bars = engine.run(&mut manager)?;

    info!(
        bars,
        balance = portfolio.balance(),
        equity = portfolio.equity(),
        available_balance = portfolio.available_balance(),
        "backtest finished"
    );
    for (symbol, quantity) in portfolio.positions() {
        info!(%symbol, quantity, "open position");
    }
    Ok(())
}
