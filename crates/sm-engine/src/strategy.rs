//! Strategy seam and the reference moving-average crossover.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use sm_types::{BarEvent, EventPayload, OrderEvent, Side, Timeframe, Topic};

use crate::engine::Engine;

/// A trading strategy consumes bar events and emits order events; the engine
/// imposes nothing else. One instance serves one (symbol, timeframe) pair.
pub trait Strategy: Send {
    fn on_bar(&mut self, event: &BarEvent) -> Vec<OrderEvent>;
}

/// Subscribe `strategy` to the bar stream of `(symbol, timeframe)` and
/// publish everything it returns on the strategy-order topic.
pub fn attach_strategy<S: Strategy + 'static>(
    engine: &Engine,
    symbol: impl Into<String>,
    timeframe: Timeframe,
    strategy: S,
) {
    let symbol = symbol.into();
    let strategy = Arc::new(Mutex::new(strategy));
    let bus = engine.bus().clone();
    let name = format!("strategy_{}_{}", symbol, timeframe);

    engine.bus().subscribe(
        Topic::NewBar {
            symbol,
            timeframe,
        },
        name.clone(),
        move |_sender, payload| {
            if let EventPayload::Bar(event) = payload {
                for order in strategy.lock().on_bar(event) {
                    debug!(symbol = %order.symbol, side = ?order.side, quantity = order.quantity, "strategy emits order");
                    bus.publish(Topic::StrategyOrder, name.clone(), EventPayload::Order(order))?;
                }
            }
            Ok(())
        },
    );
}

/// Moving-average crossover with hysteresis.
///
/// Keeps a rolling close buffer; once it holds more than `long_window`
/// entries, compares the short and long means and flips between a +1 and a
/// -1 signal state, emitting one market order per flip. Warm-up emits
/// nothing, and repeated bars on the same side of the cross are silent.
pub struct MovingAverageCrossover {
    short_window: usize,
    long_window: usize,
    closes: Vec<f64>,
    position: i8,
}

impl MovingAverageCrossover {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        debug_assert!(short_window < long_window);
        Self {
            short_window,
            long_window,
            closes: Vec::new(),
            position: 0,
        }
    }

    /// The classic 50/200 parameterization.
    pub fn default_windows() -> Self {
        Self::new(50, 200)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl Strategy for MovingAverageCrossover {
    fn on_bar(&mut self, event: &BarEvent) -> Vec<OrderEvent> {
        self.closes.push(event.bar.close as f64);

        let orders = if self.closes.len() > self.long_window {
            let n = self.closes.len();
            let short_ma = mean(&self.closes[n - self.short_window..]);
            let long_ma = mean(&self.closes[n - self.long_window..]);

            if short_ma > long_ma && self.position < 1 {
                self.position = 1;
                vec![OrderEvent::market(&event.symbol, 1, Side::Buy)]
            } else if short_ma < long_ma && self.position > -1 {
                self.position = -1;
                vec![OrderEvent::market(&event.symbol, 1, Side::Sell)]
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        // Bound the buffer: only the last long_window closes matter.
        if self.closes.len() >= 2 * self.long_window {
            let excess = self.closes.len() - self.long_window;
            self.closes.drain(..excess);
        }

        orders
    }
}
