//! Deterministic synthetic OHLCV generation.
//!
//! Random-walk series for demos and tests: same seed, same bars. Generated
//! bars always satisfy `low <= open, close <= high` and `low > 0`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use sm_types::{Bar, Timeframe};

/// Parameters for one synthetic series.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Timestamp of the first bar, epoch seconds.
    pub start_timestamp: i64,
    /// Spacing between consecutive bars.
    pub timeframe: Timeframe,
    /// Number of bars to generate.
    pub bars: usize,
    pub start_price: f64,
    /// Deterministic per-bar fractional drift.
    pub drift: f64,
    /// Amplitude of the random per-bar fractional move.
    pub volatility: f64,
    pub base_volume: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            start_timestamp: 1_700_000_000,
            timeframe: Timeframe::H1,
            bars: 500,
            start_price: 100.0,
            drift: 0.0,
            volatility: 0.01,
            base_volume: 1_000_000.0,
            seed: 42,
        }
    }
}

/// Generate a random-walk bar series from `config`.
pub fn generate_bars(config: &SyntheticConfig) -> Vec<Bar> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let step = config.timeframe.to_seconds();
    let mut price = config.start_price;
    let mut bars = Vec::with_capacity(config.bars);

    for i in 0..config.bars {
        let change = config.drift + (rng.gen::<f64>() - 0.5) * 2.0 * config.volatility;
        let open = price;
        let close = (open * (1.0 + change)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen::<f64>() * config.volatility);
        let low = (open.min(close) * (1.0 - rng.gen::<f64>() * config.volatility)).max(0.005);
        let volume = config.base_volume * (0.5 + rng.gen::<f64>());

        bars.push(Bar::new(
            config.start_timestamp + i as i64 * step,
            open as f32,
            high as f32,
            low as f32,
            close as f32,
            volume,
        ));
        price = close;
    }

    bars
}
