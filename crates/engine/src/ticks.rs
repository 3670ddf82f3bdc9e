use std::sync::Arc;

use algo_state::AlgoStateMachine;
use chrono::{Local, NaiveDateTime};
use core_types::{MarketTick, OrderRequest};
use events::EventBus;
use risk::RiskGate;
use strategies::Strategy;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::router::OrderRouter;

const COMPONENT: &str = "tick_runner";

/// Drives the owner's locked strategy with market ticks.
///
/// One tick at a time: look up the day's live strategy, let it fold the tick
/// into its state, and when it emits an intent, submit the order through the
/// router tagged with the locked algo. A rejection is an expected outcome
/// here; it is logged and published as a diagnostic, never allowed to take
/// the loop down.
pub struct TickRunner {
    machine: Arc<AlgoStateMachine>,
    gate: Arc<RiskGate>,
    router: Arc<OrderRouter>,
    bus: EventBus,
    owner_id: String,
}

impl TickRunner {
    pub fn new(
        machine: Arc<AlgoStateMachine>,
        gate: Arc<RiskGate>,
        router: Arc<OrderRouter>,
        bus: EventBus,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            machine,
            gate,
            router,
            bus,
            owner_id: owner_id.into(),
        }
    }

    pub async fn handle_tick(&self, tick: &MarketTick) {
        self.handle_tick_at(tick, Local::now().naive_local()).await
    }

    pub async fn handle_tick_at(&self, tick: &MarketTick, now: NaiveDateTime) {
        let Some(strategy) = self
            .machine
            .strategy_on(&self.owner_id, now.date())
            .await
        else {
            return;
        };

        let limits = self.gate.limits_for(&self.owner_id).await;
        // The lock is held for the signal evaluation only, never across the
        // order placement.
        let intent = {
            let mut strategy = strategy.lock().await;
            strategy.on_tick(tick, &limits)
        };
        let Some(intent) = intent else {
            return;
        };

        let algo = self
            .machine
            .selected_on(&self.owner_id, now.date())
            .await
            .map(|(algo, _)| algo);
        let mut request = OrderRequest::market(
            self.owner_id.clone(),
            intent.symbol,
            intent.side,
            intent.quantity,
        );
        request.algo = algo;

        info!(
            symbol = %request.symbol,
            side = %request.side,
            quantity = %request.quantity,
            "Strategy signal, submitting order."
        );
        match self.router.place_order_at(&request, now).await {
            Ok(order) => {
                debug!(
                    order_id = %order.order_id,
                    status = %order.status,
                    "Signal order placed."
                );
            }
            Err(EngineError::RiskRejected(rejection)) => {
                warn!("Signal order rejected: {rejection}");
                self.bus.publish_error(COMPONENT, rejection.to_string());
            }
            Err(e) => {
                error!(error = %e, "Signal order failed.");
                self.bus.publish_error(COMPONENT, e.to_string());
            }
        }
    }

    /// Consumes the tick topic until shutdown flips.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut ticks = self.bus.subscribe_ticks();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    tick = ticks.recv() => match tick {
                        Ok(tick) => self.handle_tick(&tick).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "Tick consumer lagged, continuing from the live edge.");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            info!("Tick runner wound down");
        })
    }
}
