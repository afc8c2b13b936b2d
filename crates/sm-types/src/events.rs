use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::bar::{Bar, Timeframe};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(0);

/// Next value from the process-wide event id counter.
///
/// Every event is stamped at construction, so ids are unique and strictly
/// increasing across all event kinds for the lifetime of the process.
pub fn next_event_id() -> u64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// Direction of an order or fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for Buy, -1 for Sell. Used to fold fills into signed positions.
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// Order kinds supported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
}

/// A new bar arrived on some stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvent {
    pub bar: Bar,
    pub symbol: String,
    pub id: u64,
}

impl BarEvent {
    pub fn new(bar: Bar, symbol: impl Into<String>) -> Self {
        Self {
            bar,
            symbol: symbol.into(),
            id: next_event_id(),
        }
    }
}

/// An order request travelling through the strategy → risk → order-manager
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub symbol: String,
    pub kind: OrderKind,
    pub quantity: u32,
    pub side: Side,
    /// Limit/stop price. `None` for market orders.
    pub price: Option<f64>,
    pub id: u64,
}

impl OrderEvent {
    pub fn new(
        symbol: impl Into<String>,
        kind: OrderKind,
        quantity: u32,
        side: Side,
        price: Option<f64>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
            quantity,
            side,
            price,
            id: next_event_id(),
        }
    }

    pub fn market(symbol: impl Into<String>, quantity: u32, side: Side) -> Self {
        Self::new(symbol, OrderKind::Market, quantity, side, None)
    }

    pub fn limit(symbol: impl Into<String>, quantity: u32, side: Side, price: f64) -> Self {
        Self::new(symbol, OrderKind::Limit, quantity, side, Some(price))
    }

    pub fn stop(symbol: impl Into<String>, quantity: u32, side: Side, price: f64) -> Self {
        Self::new(symbol, OrderKind::Stop, quantity, side, Some(price))
    }
}

/// Execution report for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    /// Wall-clock time the simulated fill was produced, epoch seconds.
    pub timestamp: i64,
    pub symbol: String,
    pub quantity: u32,
    pub side: Side,
    pub fill_price: f64,
    pub commission: f64,
    /// Id of the [`OrderEvent`] this fill satisfies.
    pub order_ref: u64,
    pub id: u64,
}

impl FillEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: i64,
        symbol: impl Into<String>,
        quantity: u32,
        side: Side,
        fill_price: f64,
        commission: f64,
        order_ref: u64,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            quantity,
            side,
            fill_price,
            commission,
            order_ref,
            id: next_event_id(),
        }
    }
}

/// Routing key on the event bus.
///
/// One variant per event kind; the per-instrument parameters that used to be
/// encoded in topic strings live inside the `NewBar` variant. `Display`
/// renders the stable wire names used in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// A data stream registered itself. Payload: stream descriptor string.
    NewDataStream,
    /// A bar was published for one (symbol, timeframe) stream.
    NewBar { symbol: String, timeframe: Timeframe },
    /// Order emitted by a strategy.
    StrategyOrder,
    /// Order forwarded by the risk manager.
    RiskManagerOrder,
    /// Order forwarded by the order manager.
    OrderManagerOrder,
    /// Fill produced by the broker interface.
    BrokerFill,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::NewDataStream => write!(f, "new_data_stream"),
            Topic::NewBar { symbol, timeframe } => {
                write!(f, "new_bar_{}_{}", symbol, timeframe)
            }
            Topic::StrategyOrder => write!(f, "strategy_order"),
            Topic::RiskManagerOrder => write!(f, "risk_manager_order"),
            Topic::OrderManagerOrder => write!(f, "order_manager_order"),
            Topic::BrokerFill => write!(f, "broker_interface_fill"),
        }
    }
}

/// Payload delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Bar(BarEvent),
    Order(OrderEvent),
    Fill(FillEvent),
    /// Stream descriptor string, `"symbol_{sym}_{tf}"`.
    StreamAdded(String),
}

/// Descriptor string a stream registers under in the shared store,
/// `"symbol_{sym}_{tf}"`.
pub fn stream_descriptor(symbol: &str, timeframe: Timeframe) -> String {
    format!("symbol_{}_{}", symbol, timeframe)
}

/// Inverse of [`stream_descriptor`]. Symbols may themselves contain
/// underscores, so the timeframe is taken from the last segment.
pub fn parse_stream_descriptor(descriptor: &str) -> Option<(String, Timeframe)> {
    let rest = descriptor.strip_prefix("symbol_")?;
    let (symbol, tf) = rest.rsplit_once('_')?;
    if symbol.is_empty() {
        return None;
    }
    Some((symbol.to_string(), tf.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_unique_and_increasing() {
        let a = BarEvent::new(Bar::flat(0, 1.0, 1.0), "AAPL");
        let b = OrderEvent::market("AAPL", 1, Side::Buy);
        let c = FillEvent::new(0, "AAPL", 1, Side::Buy, 1.0, 0.0, b.id);
        assert!(a.id < b.id);
        assert!(b.id < c.id);
        assert_eq!(c.order_ref, b.id);
    }

    #[test]
    fn order_constructors_set_kind_and_price() {
        let market = OrderEvent::market("MSFT", 10, Side::Buy);
        assert_eq!(market.kind, OrderKind::Market);
        assert_eq!(market.price, None);

        let limit = OrderEvent::limit("MSFT", 10, Side::Sell, 250.0);
        assert_eq!(limit.kind, OrderKind::Limit);
        assert_eq!(limit.price, Some(250.0));

        let stop = OrderEvent::stop("MSFT", 10, Side::Sell, 240.0);
        assert_eq!(stop.kind, OrderKind::Stop);
    }

    #[test]
    fn side_sign() {
        assert_eq!(Side::Buy.sign(), 1);
        assert_eq!(Side::Sell.sign(), -1);
    }

    #[test]
    fn topic_wire_names() {
        let topic = Topic::NewBar {
            symbol: "BTC-USD".into(),
            timeframe: Timeframe::H1,
        };
        assert_eq!(topic.to_string(), "new_bar_BTC-USD_1h");
        assert_eq!(Topic::BrokerFill.to_string(), "broker_interface_fill");
        assert_eq!(Topic::StrategyOrder.to_string(), "strategy_order");
    }

    #[test]
    fn stream_descriptor_roundtrip() {
        let descriptor = stream_descriptor("BTC_USD", Timeframe::M15);
        assert_eq!(descriptor, "symbol_BTC_USD_15m");
        let (symbol, tf) = parse_stream_descriptor(&descriptor).unwrap();
        assert_eq!(symbol, "BTC_USD");
        assert_eq!(tf, Timeframe::M15);
    }

    #[test]
    fn stream_descriptor_rejects_garbage() {
        assert!(parse_stream_descriptor("new_bar_AAPL_1h").is_none());
        assert!(parse_stream_descriptor("symbol_AAPL_2h").is_none());
        assert!(parse_stream_descriptor("symbol_").is_none());
    }
}
