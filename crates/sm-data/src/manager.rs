//! N-way time-merge scheduler.
//!
//! One buffered slot per registered stream is the minimum state that yields a
//! correct merge across heterogeneous timeframes: refill empty slots, always
//! drain the globally earliest bar. The published timestamp sequence is
//! non-decreasing across all streams.

use sm_bus::{Dispatcher, SharedStore};
use sm_types::{Bar, BarEvent, EngineResult, EventPayload, Topic};
use tracing::debug;

use crate::stream::DataStream;

struct Registered {
    stream: Box<dyn DataStream>,
    slot: Option<Bar>,
}

/// Owns the data streams and drives the backtest clock.
pub struct DataManager {
    bus: Dispatcher,
    store: SharedStore,
    streams: Vec<Registered>,
}

impl DataManager {
    pub fn new(bus: Dispatcher, store: SharedStore, streams: Vec<Box<dyn DataStream>>) -> Self {
        Self {
            bus,
            store,
            streams: streams
                .into_iter()
                .map(|stream| Registered { stream, slot: None })
                .collect(),
        }
    }

    /// Add a stream after construction. Registration order is significant:
    /// it breaks timestamp ties.
    pub fn register(&mut self, stream: Box<dyn DataStream>) {
        self.streams.push(Registered { stream, slot: None });
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Publish the globally earliest pending bar.
    ///
    /// Returns `Ok(false)` once every stream is exhausted, so the backtest loop
    /// is `while manager.advance()? {}`. A fatal error raised by a subscriber
    /// while the bar is dispatched propagates out of the publish.
    pub fn advance(&mut self) -> EngineResult<bool> {
        for registered in &mut self.streams {
            if registered.slot.is_none() {
                registered.slot = registered.stream.next_bar();
            }
        }

        // Strictly-smaller comparison keeps ties on the earliest-registered
        // stream.
        let mut selected: Option<(usize, i64)> = None;
        for (index, registered) in self.streams.iter().enumerate() {
            if let Some(bar) = &registered.slot {
                if selected.map_or(true, |(_, best)| bar.timestamp < best) {
                    selected = Some((index, bar.timestamp));
                }
            }
        }
        let Some((index, _)) = selected else {
            debug!("all streams exhausted");
            return Ok(false);
        };

        let registered = &mut self.streams[index];
        let Some(bar) = registered.slot.take() else {
            return Ok(false);
        };
        let symbol = registered.stream.symbol().to_string();
        let timeframe = registered.stream.timeframe();

        self.store.record_last_price(&symbol, bar.clone());
        debug!(%symbol, %timeframe, timestamp = bar.timestamp, "publishing bar");
        self.bus.publish(
            Topic::NewBar {
                symbol: symbol.clone(),
                timeframe,
            },
            "data_manager",
            EventPayload::Bar(BarEvent::new(bar, symbol)),
        )?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::BacktestStream;
    use parking_lot::Mutex;
    use sm_types::Timeframe;
    use std::sync::Arc;

    fn flat_bars(timestamps: &[i64]) -> Vec<Bar> {
        timestamps.iter().map(|&t| Bar::flat(t, 10.0, 1.0)).collect()
    }

    /// Collect `(symbol, timestamp)` pairs from every published bar event.
    fn collect_bars(bus: &Dispatcher, symbols: &[(&str, Timeframe)]) -> Arc<Mutex<Vec<(String, i64)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for (symbol, timeframe) in symbols {
            bus.subscribe(
                Topic::NewBar {
                    symbol: (*symbol).into(),
                    timeframe: *timeframe,
                },
                "collector",
                {
                    let seen = Arc::clone(&seen);
                    move |_sender, payload| {
                        if let EventPayload::Bar(event) = payload {
                            seen.lock().push((event.symbol.clone(), event.bar.timestamp));
                        }
                        Ok(())
                    }
                },
            );
        }
        seen
    }

    #[test]
    fn merges_two_streams_in_timestamp_order() {
        let bus = Dispatcher::new();
        let store = SharedStore::new();
        let a = BacktestStream::new(&bus, &store, "A", Timeframe::H1, flat_bars(&[100, 200, 300]))
            .unwrap();
        let b = BacktestStream::new(&bus, &store, "B", Timeframe::H1, flat_bars(&[150, 250, 350]))
            .unwrap();

        let seen = collect_bars(&bus, &[("A", Timeframe::H1), ("B", Timeframe::H1)]);
        let mut manager = DataManager::new(bus, store, vec![Box::new(a), Box::new(b)]);

        for _ in 0..6 {
            assert!(manager.advance().unwrap());
        }
        assert!(!manager.advance().unwrap());

        let expected: Vec<(String, i64)> = [
            ("A", 100),
            ("B", 150),
            ("A", 200),
            ("B", 250),
            ("A", 300),
            ("B", 350),
        ]
        .into_iter()
        .map(|(s, t)| (s.to_string(), t))
        .collect();
        assert_eq!(*seen.lock(), expected);
    }

    #[test]
    fn published_timestamps_are_non_decreasing() {
        let bus = Dispatcher::new();
        let store = SharedStore::new();
        let a = BacktestStream::new(
            &bus,
            &store,
            "A",
            Timeframe::M15,
            flat_bars(&[100, 1000, 1100, 5000]),
        )
        .unwrap();
        let b = BacktestStream::new(&bus, &store, "B", Timeframe::H4, flat_bars(&[50, 4000]))
            .unwrap();
        let c = BacktestStream::new(&bus, &store, "C", Timeframe::D1, flat_bars(&[2000])).unwrap();

        let seen = collect_bars(
            &bus,
            &[
                ("A", Timeframe::M15),
                ("B", Timeframe::H4),
                ("C", Timeframe::D1),
            ],
        );
        let mut manager =
            DataManager::new(bus, store, vec![Box::new(a), Box::new(b), Box::new(c)]);
        while manager.advance().unwrap() {}

        let timestamps: Vec<i64> = seen.lock().iter().map(|(_, t)| *t).collect();
        assert_eq!(timestamps.len(), 7);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn ties_break_by_registration_order() {
        let bus = Dispatcher::new();
        let store = SharedStore::new();
        let a = BacktestStream::new(&bus, &store, "A", Timeframe::H1, flat_bars(&[100, 200]))
            .unwrap();
        let b = BacktestStream::new(&bus, &store, "B", Timeframe::H1, flat_bars(&[100, 200]))
            .unwrap();

        let seen = collect_bars(&bus, &[("A", Timeframe::H1), ("B", Timeframe::H1)]);
        let mut manager = DataManager::new(bus, store, vec![Box::new(a)]);
        manager.register(Box::new(b));
        assert_eq!(manager.stream_count(), 2);
        while manager.advance().unwrap() {}

        let symbols: Vec<String> = seen.lock().iter().map(|(s, _)| s.clone()).collect();
        assert_eq!(symbols, vec!["A", "B", "A", "B"]);
    }

    #[test]
    fn updates_last_prices_before_publishing() {
        let bus = Dispatcher::new();
        let store = SharedStore::new();
        let bars = vec![Bar::new(100, 9.0, 11.0, 8.0, 10.5, 42.0)];
        let a = BacktestStream::new(&bus, &store, "AAPL", Timeframe::H1, bars).unwrap();

        // The subscriber must already see the new last price.
        let observed = Arc::new(Mutex::new(None));
        bus.subscribe(
            Topic::NewBar {
                symbol: "AAPL".into(),
                timeframe: Timeframe::H1,
            },
            "price-check",
            {
                let observed = Arc::clone(&observed);
                let store = store.clone();
                move |_sender, _payload| {
                    *observed.lock() = store.last_price("AAPL").map(|bar| bar.close);
                    Ok(())
                }
            },
        );

        let mut manager = DataManager::new(bus, store.clone(), vec![Box::new(a)]);
        assert!(manager.advance().unwrap());
        assert_eq!(*observed.lock(), Some(10.5));
        assert_eq!(store.last_price("AAPL").unwrap().timestamp, 100);
    }

    #[test]
    fn empty_manager_is_immediately_exhausted() {
        let bus = Dispatcher::new();
        let store = SharedStore::new();
        let mut manager = DataManager::new(bus, store, vec![]);
        assert!(!manager.advance().unwrap());
        assert_eq!(manager.stream_count(), 0);
    }
}
