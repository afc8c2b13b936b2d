//! Process-wide shared key-value directory.
//!
//! Values are stored as `Arc<dyn Any>`, opaque and never deep-copied. A
//! reader that wants to mutate a composite value (the `last_prices` map)
//! clones it, mutates the clone, and writes it back; the typed helpers below
//! do exactly that under the map's entry lock.

use dashmap::DashMap;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use sm_types::Bar;

/// Directory of registered stream descriptors, `Vec<String>`.
pub const KEY_DATA_STREAMS: &str = "data_streams";
/// Most recent bar per symbol, `HashMap<String, Bar>`.
pub const KEY_LAST_PRICES: &str = "last_prices";
/// Cash not reserved by pending orders, `f64`.
pub const KEY_AVAILABLE_BALANCE: &str = "available_balance";

type Value = Arc<dyn Any + Send + Sync>;

/// Handle to the process's shared store. Clones share the same map.
#[derive(Clone, Default)]
pub struct SharedStore {
    inner: Arc<DashMap<String, Value>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set<T: Send + Sync + 'static>(&self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Arc::new(value));
    }

    /// Fetch the value under `key`, if present and of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.inner.get(key)?.value().clone();
        value.downcast::<T>().ok()
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    // -- recognized keys ----------------------------------------------------

    /// Snapshot of the `last_prices` map (empty if never written).
    pub fn last_prices(&self) -> Arc<HashMap<String, Bar>> {
        self.get(KEY_LAST_PRICES).unwrap_or_default()
    }

    /// Most recent bar for `symbol`, if any.
    pub fn last_price(&self, symbol: &str) -> Option<Bar> {
        self.last_prices().get(symbol).cloned()
    }

    /// Record `bar` as the latest for `symbol` (clone, insert, write back).
    pub fn record_last_price(&self, symbol: &str, bar: Bar) {
        let mut entry = self
            .inner
            .entry(KEY_LAST_PRICES.to_string())
            .or_insert_with(|| Arc::new(HashMap::<String, Bar>::new()) as Value);
        let mut updated = entry
            .value()
            .clone()
            .downcast::<HashMap<String, Bar>>()
            .map(|prices| (*prices).clone())
            .unwrap_or_default();
        updated.insert(symbol.to_string(), bar);
        *entry.value_mut() = Arc::new(updated);
    }

    /// Registered stream descriptors, in registration order.
    pub fn data_streams(&self) -> Vec<String> {
        self.get::<Vec<String>>(KEY_DATA_STREAMS)
            .map(|streams| (*streams).clone())
            .unwrap_or_default()
    }

    /// Append a stream descriptor to the directory.
    pub fn push_data_stream(&self, descriptor: String) {
        let mut entry = self
            .inner
            .entry(KEY_DATA_STREAMS.to_string())
            .or_insert_with(|| Arc::new(Vec::<String>::new()) as Value);
        let mut updated = entry
            .value()
            .clone()
            .downcast::<Vec<String>>()
            .map(|streams| (*streams).clone())
            .unwrap_or_default();
        updated.push(descriptor);
        *entry.value_mut() = Arc::new(updated);
    }

    pub fn set_available_balance(&self, value: f64) {
        self.set(KEY_AVAILABLE_BALANCE, value);
    }

    pub fn available_balance(&self) -> Option<f64> {
        self.get::<f64>(KEY_AVAILABLE_BALANCE).map(|value| *value)
    }
}
