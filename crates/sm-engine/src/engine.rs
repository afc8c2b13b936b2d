//! Engine aggregate: one bus, one store, one driver loop.
//!
//! Instead of hidden process-wide singletons, the `Engine` owns the
//! [`Dispatcher`] and [`SharedStore`] explicitly and hands them to every
//! component constructor. Tests get full isolation by building one engine
//! per case.

use sm_bus::{Dispatcher, SharedStore};
use sm_data::DataManager;
use sm_types::EngineResult;
use tracing::info;

pub struct Engine {
    bus: Dispatcher,
    store: SharedStore,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            bus: Dispatcher::new(),
            store: SharedStore::new(),
        }
    }

    pub fn bus(&self) -> &Dispatcher {
        &self.bus
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Drive the backtest to exhaustion. Returns the number of bars
    /// published. The pipeline for one bar (strategy → risk → order manager →
    /// broker → portfolio) fully drains inside each `advance` call, so a
    /// fatal accounting error surfaces here and aborts the run.
    pub fn run(&self, manager: &mut DataManager) -> EngineResult<u64> {
        let mut bars = 0u64;
        while manager.advance()? {
            bars += 1;
        }
        info!(bars, "backtest complete");
        Ok(bars)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
