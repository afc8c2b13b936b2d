//! Risk manager stage of the order pipeline.
//!
//! Today every strategy order is forwarded unchanged; this stage exists so
//! that limit checks (max position, max notional, blackout windows) can be
//! inserted without touching strategies or the order manager.

use sm_types::{EventPayload, Topic};
use tracing::debug;

use crate::engine::Engine;

pub struct RiskManager;

impl RiskManager {
    /// Wire the stage into `engine`: strategy orders in, risk-manager orders
    /// out.
    pub fn attach(engine: &Engine) {
        let bus = engine.bus().clone();
        engine
            .bus()
            .subscribe(Topic::StrategyOrder, "risk_manager", move |_sender, payload| {
                if let EventPayload::Order(order) = payload {
                    debug!(order_id = order.id, symbol = %order.symbol, "risk manager forwards order");
                    bus.publish(
                        Topic::RiskManagerOrder,
                        "risk_manager",
                        EventPayload::Order(order.clone()),
                    )?;
                }
                Ok(())
            });
    }
}
