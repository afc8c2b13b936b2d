//! Order manager stage of the order pipeline.
//!
//! Pass-through for now; order-lifecycle concerns (cancels, modifies,
//! broker-specific encoding) belong here, separated from risk logic.

use sm_types::{EventPayload, Topic};
use tracing::debug;

use crate::engine::Engine;

pub struct OrderManager;

impl OrderManager {
    /// Wire the stage into `engine`: risk-manager orders in, order-manager
    /// orders out.
    pub fn attach(engine: &Engine) {
        let bus = engine.bus().clone();
        engine.bus().subscribe(
            Topic::RiskManagerOrder,
            "order_manager",
            move |_sender, payload| {
                if let EventPayload::Order(order) = payload {
                    debug!(order_id = order.id, symbol = %order.symbol, "order manager forwards order");
                    bus.publish(
                        Topic::OrderManagerOrder,
                        "order_manager",
                        EventPayload::Order(order.clone()),
                    )?;
                }
                Ok(())
            },
        );
    }
}
