//! Portfolio accounting state machine.
//!
//! Cash, signed positions, equity mark-to-market, pending-order reservations
//! and margin-call detection, driven entirely by bus events. All state is
//! mutated from inside dispatcher callbacks; because the bus runs one
//! cooperative worker, the mutex here is never contended during a backtest.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

use sm_bus::{Dispatcher, SharedStore};
use sm_types::{
    parse_stream_descriptor, Bar, BarEvent, EngineResult, EventPayload, FillEvent, OrderEvent,
    OrderKind, PortfolioError, Side, Timeframe, Topic,
};

use crate::engine::Engine;

/// Starting cash for every portfolio.
pub const INITIAL_BALANCE: f64 = 100_000.0;

/// Maintenance margin for short positions: 100% of current notional.
const MAINTENANCE_MARGIN_RATE: f64 = 1.0;

struct State {
    balance: f64,
    available_balance: f64,
    equity: f64,
    positions: HashMap<String, i64>,
    pending_orders: Vec<OrderEvent>,
    last_prices: HashMap<String, Bar>,
    store: SharedStore,
}

impl State {
    fn new(store: SharedStore) -> Self {
        store.set_available_balance(INITIAL_BALANCE);
        Self {
            balance: INITIAL_BALANCE,
            available_balance: INITIAL_BALANCE,
            equity: INITIAL_BALANCE,
            positions: HashMap::new(),
            pending_orders: Vec::new(),
            last_prices: HashMap::new(),
            store,
        }
    }

    fn on_bar(&mut self, event: &BarEvent) {
        self.last_prices
            .insert(event.symbol.clone(), event.bar.clone());
        self.check_margin();
        self.update_equity();
    }

    fn on_order(&mut self, order: &OrderEvent) {
        self.pending_orders.push(order.clone());
        self.update_available_balance();
    }

    fn apply_fill(&mut self, fill: &FillEvent) -> EngineResult<()> {
        let before = self.pending_orders.len();
        self.pending_orders.retain(|order| order.id != fill.order_ref);
        if self.pending_orders.len() == before {
            warn!(
                order_ref = fill.order_ref,
                symbol = %fill.symbol,
                "fill matches no pending order"
            );
        }

        self.update_positions(fill);
        self.update_balance(fill)?;
        self.update_available_balance();
        self.update_equity();
        Ok(())
    }

    fn update_positions(&mut self, fill: &FillEvent) {
        // An absent entry starts from zero, so an initial SELL opens a short.
        let delta = fill.side.sign() * fill.quantity as i64;
        *self.positions.entry(fill.symbol.clone()).or_insert(0) += delta;
    }

    fn update_balance(&mut self, fill: &FillEvent) -> EngineResult<()> {
        let transaction_value = fill.quantity as f64 * fill.fill_price;
        match fill.side {
            Side::Buy => self.balance -= transaction_value,
            Side::Sell => self.balance += transaction_value,
        }
        self.balance -= fill.commission;

        if self.balance < 0.0 {
            error!(balance = self.balance, "balance cannot be negative");
            return Err(PortfolioError::NegativeBalance {
                balance: self.balance,
            }
            .into());
        }
        Ok(())
    }

    /// `balance` minus the notional reserved by pending orders. Market
    /// orders reserve at the last known close; with no price on record they
    /// are skipped from the sum.
    fn update_available_balance(&mut self) {
        let mut available = self.balance;
        for order in &self.pending_orders {
            let reference_price = match order.kind {
                OrderKind::Market => match self.last_prices.get(&order.symbol) {
                    Some(bar) => bar.close as f64,
                    None => {
                        warn!(symbol = %order.symbol, "no price data to reserve against");
                        continue;
                    }
                },
                OrderKind::Limit | OrderKind::Stop => match order.price {
                    Some(price) => price,
                    None => {
                        warn!(order_id = order.id, "pending order carries no price");
                        continue;
                    }
                },
            };
            available -= order.quantity as f64 * reference_price;
        }
        self.available_balance = available;
        self.store.set_available_balance(available);
    }

    fn update_equity(&mut self) {
        let mut equity = self.balance;
        for (symbol, quantity) in &self.positions {
            if let Some(bar) = self.last_prices.get(symbol) {
                equity += *quantity as f64 * bar.close as f64;
            }
        }
        self.equity = equity;
    }

    /// Diagnostic check for shorts whose maintenance margin exceeds equity.
    /// Logs per offending symbol; no enforcement side effect.
    fn check_margin(&self) -> bool {
        let mut margin_call = false;
        for (symbol, quantity) in &self.positions {
            if *quantity >= 0 {
                continue;
            }
            let Some(bar) = self.last_prices.get(symbol) else {
                continue;
            };
            let position_value = quantity.unsigned_abs() as f64 * bar.close as f64;
            let maintenance_margin = position_value * MAINTENANCE_MARGIN_RATE;
            if self.equity < maintenance_margin {
                margin_call = true;
                error!(
                    %symbol,
                    equity = self.equity,
                    maintenance_margin,
                    "margin call"
                );
            }
        }
        margin_call
    }
}

/// Handle to a portfolio wired into an engine.
pub struct Portfolio {
    state: Arc<Mutex<State>>,
}

impl Portfolio {
    /// Attach a fresh portfolio to `engine`.
    ///
    /// Subscribes to the bar topic of every stream already in the store's
    /// directory, to stream announcements (to pick up later streams), to
    /// order-manager orders, and to broker fills.
    pub fn attach(engine: &Engine) -> Self {
        let state = Arc::new(Mutex::new(State::new(engine.store().clone())));
        let bus = engine.bus().clone();

        for descriptor in engine.store().data_streams() {
            match parse_stream_descriptor(&descriptor) {
                Some((symbol, timeframe)) => {
                    Self::subscribe_bars(&bus, &state, symbol, timeframe)
                }
                None => warn!(%descriptor, "unparseable stream descriptor"),
            }
        }

        bus.subscribe(Topic::NewDataStream, "portfolio", {
            let bus = bus.clone();
            let state = Arc::clone(&state);
            move |_sender, payload| {
                if let EventPayload::StreamAdded(descriptor) = payload {
                    match parse_stream_descriptor(descriptor) {
                        Some((symbol, timeframe)) => {
                            Self::subscribe_bars(&bus, &state, symbol, timeframe)
                        }
                        None => warn!(%descriptor, "unparseable stream descriptor"),
                    }
                }
                Ok(())
            }
        });

        bus.subscribe(Topic::OrderManagerOrder, "portfolio", {
            let state = Arc::clone(&state);
            move |_sender, payload| {
                if let EventPayload::Order(order) = payload {
                    state.lock().on_order(order);
                }
                Ok(())
            }
        });

        bus.subscribe(Topic::BrokerFill, "portfolio", {
            let state = Arc::clone(&state);
            move |_sender, payload| {
                if let EventPayload::Fill(fill) = payload {
                    state.lock().apply_fill(fill)?;
                }
                Ok(())
            }
        });

        Self { state }
    }

    fn subscribe_bars(
        bus: &Dispatcher,
        state: &Arc<Mutex<State>>,
        symbol: String,
        timeframe: Timeframe,
    ) {
        bus.subscribe(Topic::NewBar { symbol, timeframe }, "portfolio", {
            let state = Arc::clone(state);
            move |_sender, payload| {
                if let EventPayload::Bar(event) = payload {
                    state.lock().on_bar(event);
                }
                Ok(())
            }
        });
    }

    // -- inspection ---------------------------------------------------------

    pub fn balance(&self) -> f64 {
        self.state.lock().balance
    }

    pub fn available_balance(&self) -> f64 {
        self.state.lock().available_balance
    }

    pub fn equity(&self) -> f64 {
        self.state.lock().equity
    }

    /// Signed quantity held for `symbol`; zero when no entry exists.
    pub fn position(&self, symbol: &str) -> i64 {
        self.state.lock().positions.get(symbol).copied().unwrap_or(0)
    }

    pub fn positions(&self) -> HashMap<String, i64> {
        self.state.lock().positions.clone()
    }

    pub fn pending_orders(&self) -> Vec<OrderEvent> {
        self.state.lock().pending_orders.clone()
    }

    /// Run the short-position margin check against current state.
    pub fn check_margin_requirements(&self) -> bool {
        self.state.lock().check_margin()
    }
}
