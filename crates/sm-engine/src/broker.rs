//! Mock broker: immediate, full, no-slippage fills.
//!
//! This is deliberately the seam where a realistic execution model (partial
//! fills, latency, slippage) would live. Market orders fill at the last
//! known close from the shared store; limit and stop orders fill at their
//! own price.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

use sm_types::{EventPayload, FillEvent, OrderEvent, OrderKind, Topic};

use crate::engine::Engine;

/// Commission policy hook. The simulator computes the fill price; the model
/// decides what the trade costs.
pub trait CommissionModel: Send + Sync {
    fn commission(&self, order: &OrderEvent, fill_price: f64) -> f64;
}

/// Free trading.
pub struct NoCommission;

impl CommissionModel for NoCommission {
    fn commission(&self, _order: &OrderEvent, _fill_price: f64) -> f64 {
        0.0
    }
}

/// Fixed rate per share.
pub struct PerShare {
    pub rate: f64,
}

impl CommissionModel for PerShare {
    fn commission(&self, order: &OrderEvent, _fill_price: f64) -> f64 {
        order.quantity as f64 * self.rate
    }
}

/// Flat amount per trade.
pub struct Flat {
    pub amount: f64,
}

impl CommissionModel for Flat {
    fn commission(&self, _order: &OrderEvent, _fill_price: f64) -> f64 {
        self.amount
    }
}

pub struct BrokerSim;

impl BrokerSim {
    /// Wire the simulator into `engine`: order-manager orders in, fills out.
    ///
    /// A market order with no recorded last price is dropped with an error
    /// log; there is no retry. Same for a limit/stop order carrying no
    /// price.
    pub fn attach(engine: &Engine, commission: impl CommissionModel + 'static) {
        let bus = engine.bus().clone();
        let store = engine.store().clone();
        let commission = Arc::new(commission);

        engine.bus().subscribe(
            Topic::OrderManagerOrder,
            "broker_interface",
            move |_sender, payload| {
                let EventPayload::Order(order) = payload else {
                    return Ok(());
                };

                let fill_price = match order.kind {
                    OrderKind::Market => match store.last_price(&order.symbol) {
                        Some(bar) => bar.close as f64,
                        None => {
                            error!(
                                order_id = order.id,
                                symbol = %order.symbol,
                                "no last price for market order, dropping fill"
                            );
                            return Ok(());
                        }
                    },
                    OrderKind::Limit | OrderKind::Stop => match order.price {
                        Some(price) => price,
                        None => {
                            error!(
                                order_id = order.id,
                                symbol = %order.symbol,
                                kind = ?order.kind,
                                "order carries no price, dropping fill"
                            );
                            return Ok(());
                        }
                    },
                };

                let fill = FillEvent::new(
                    Utc::now().timestamp(),
                    &order.symbol,
                    order.quantity,
                    order.side,
                    fill_price,
                    commission.commission(order, fill_price),
                    order.id,
                );
                debug!(
                    order_ref = fill.order_ref,
                    symbol = %fill.symbol,
                    fill_price,
                    "simulated fill"
                );
                bus.publish(Topic::BrokerFill, "broker_interface", EventPayload::Fill(fill))?;
                Ok(())
            },
        );
    }
}
