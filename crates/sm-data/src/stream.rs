//! Bar source abstraction.
//!
//! A stream announces itself on the bus and in the shared store's
//! `data_streams` directory at registration, so late-constructed components
//! (the portfolio) can find streams that existed before them and hear about
//! streams created after.

use std::path::Path;

use sm_bus::{Dispatcher, SharedStore};
use sm_types::{stream_descriptor, Bar, EngineResult, EventPayload, Timeframe, Topic};
use tracing::info;

use crate::loaders::load_bars_csv;

/// Whether a stream replays recorded history or follows a live feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Backtest,
    /// Reserved for a future live implementation behind the same interface.
    Live,
}

/// Polymorphic bar source.
pub trait DataStream: Send {
    fn symbol(&self) -> &str;
    fn timeframe(&self) -> Timeframe;
    fn kind(&self) -> StreamKind;
    /// Next bar in ascending timestamp order, or `None` when exhausted.
    fn next_bar(&mut self) -> Option<Bar>;
}

/// Announce a stream on the bus and in the store. Returns the descriptor.
fn announce(
    bus: &Dispatcher,
    store: &SharedStore,
    symbol: &str,
    timeframe: Timeframe,
) -> EngineResult<String> {
    let descriptor = stream_descriptor(symbol, timeframe);
    store.push_data_stream(descriptor.clone());
    bus.publish(
        Topic::NewDataStream,
        "data_stream",
        EventPayload::StreamAdded(descriptor.clone()),
    )?;
    Ok(descriptor)
}

/// Replays a finite, timestamp-sorted bar sequence.
pub struct BacktestStream {
    symbol: String,
    timeframe: Timeframe,
    bars: std::vec::IntoIter<Bar>,
}

impl BacktestStream {
    /// Wrap an in-memory bar sequence. Announces the stream as a side effect.
    pub fn new(
        bus: &Dispatcher,
        store: &SharedStore,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        bars: Vec<Bar>,
    ) -> EngineResult<Self> {
        let symbol = symbol.into();
        let descriptor = announce(bus, store, &symbol, timeframe)?;
        info!(%descriptor, bars = bars.len(), "registered backtest stream");
        Ok(Self {
            symbol,
            timeframe,
            bars: bars.into_iter(),
        })
    }

    /// Load the sequence from a CSV file (see [`load_bars_csv`]).
    pub fn from_csv(
        bus: &Dispatcher,
        store: &SharedStore,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        path: impl AsRef<Path>,
    ) -> EngineResult<Self> {
        let bars = load_bars_csv(path)?;
        Self::new(bus, store, symbol, timeframe, bars)
    }
}

impl DataStream for BacktestStream {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Backtest
    }

    fn next_bar(&mut self) -> Option<Bar> {
        self.bars.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn flat_bars(timestamps: &[i64]) -> Vec<Bar> {
        timestamps.iter().map(|&t| Bar::flat(t, 10.0, 1.0)).collect()
    }

    #[test]
    fn yields_bars_in_order_then_none() {
        let bus = Dispatcher::new();
        let store = SharedStore::new();
        let mut stream =
            BacktestStream::new(&bus, &store, "AAPL", Timeframe::H1, flat_bars(&[100, 200]))
                .unwrap();

        assert_eq!(stream.next_bar().unwrap().timestamp, 100);
        assert_eq!(stream.next_bar().unwrap().timestamp, 200);
        assert!(stream.next_bar().is_none());
        assert!(stream.next_bar().is_none());
    }

    #[test]
    fn registration_announces_on_bus_and_store() {
        let bus = Dispatcher::new();
        let store = SharedStore::new();

        let announced = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Topic::NewDataStream, "listener", {
            let announced = Arc::clone(&announced);
            move |_sender, payload| {
                if let EventPayload::StreamAdded(descriptor) = payload {
                    announced.lock().push(descriptor.clone());
                }
                Ok(())
            }
        });

        let _stream =
            BacktestStream::new(&bus, &store, "MSFT", Timeframe::D1, flat_bars(&[1])).unwrap();

        assert_eq!(store.data_streams(), vec!["symbol_MSFT_1d".to_string()]);
        assert_eq!(*announced.lock(), vec!["symbol_MSFT_1d".to_string()]);
    }

    #[test]
    fn from_csv_loads_and_replays_rows() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"Datetime,Open,High,Low,Close,Volume\n\
              2024-01-02 09:00:00,100.0,101.0,99.5,100.5,1000\n\
              2024-01-02 10:00:00,100.5,102.0,100.4,101.7,2000\n",
        )
        .unwrap();

        let bus = Dispatcher::new();
        let store = SharedStore::new();
        let mut stream =
            BacktestStream::from_csv(&bus, &store, "SPY", Timeframe::H1, file.path()).unwrap();

        assert_eq!(store.data_streams(), vec!["symbol_SPY_1h".to_string()]);
        assert_eq!(stream.next_bar().unwrap().close, 100.5);
        assert_eq!(stream.next_bar().unwrap().close, 101.7);
        assert!(stream.next_bar().is_none());
    }

    #[test]
    fn stream_kind_is_backtest() {
        let bus = Dispatcher::new();
        let store = SharedStore::new();
        let stream = BacktestStream::new(&bus, &store, "AAPL", Timeframe::M5, vec![]).unwrap();
        assert_eq!(stream.kind(), StreamKind::Backtest);
        assert_eq!(stream.symbol(), "AAPL");
        assert_eq!(stream.timeframe(), Timeframe::M5);
    }
}
