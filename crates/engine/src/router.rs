use std::sync::Arc;

use algo_state::AlgoStateMachine;
use broker_client::BrokerClient;
use chrono::{Local, NaiveDateTime};
use core_types::{EventSeverity, Order, OrderRequest, OrderStatus, SystemEvent, TradeMode};
use events::{EventBus, LogLevel};
use executor::PaperBroker;
use risk::RiskGate;
use rust_decimal::Decimal;
use serde_json::json;
use store::Store;
use tracing::{info, warn};

use crate::error::EngineError;

const COMPONENT: &str = "order_router";

/// The single entry point for placing orders.
///
/// Every request runs the same gauntlet regardless of destination:
/// structural validation, the algo-day run check, the risk gate, then the
/// mode branch. Paper orders go to the virtual execution engine; live orders
/// go to the broker, with a local audit order persisted under the broker's
/// id for the reconciler to keep current.
///
/// A successful placement counts as one trade with the risk gate, carrying
/// whatever PnL the immediate fill realized (zero for resting or live
/// orders). That is what arms the cooldown and the daily trade ceiling.
pub struct OrderRouter {
    store: Arc<dyn Store>,
    machine: Arc<AlgoStateMachine>,
    gate: Arc<RiskGate>,
    paper: Arc<PaperBroker>,
    broker: Arc<dyn BrokerClient>,
    bus: EventBus,
}

impl OrderRouter {
    pub fn new(
        store: Arc<dyn Store>,
        machine: Arc<AlgoStateMachine>,
        gate: Arc<RiskGate>,
        paper: Arc<PaperBroker>,
        broker: Arc<dyn BrokerClient>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            machine,
            gate,
            paper,
            broker,
            bus,
        }
    }

    pub async fn place_order(&self, request: &OrderRequest) -> Result<Order, EngineError> {
        self.place_order_at(request, Local::now().naive_local())
            .await
    }

    pub async fn place_order_at(
        &self,
        request: &OrderRequest,
        now: NaiveDateTime,
    ) -> Result<Order, EngineError> {
        request.validate()?;

        if !self
            .machine
            .is_running_on(&request.owner_id, now.date())
            .await
        {
            warn!(
                owner_id = %request.owner_id,
                "Order refused: no algo is running today."
            );
            return Err(EngineError::AlgoNotRunning(request.owner_id.clone()));
        }

        let pnl_pct = self.gate.daily_pnl_pct_at(&request.owner_id, now).await;
        if let Err(rejection) = self
            .gate
            .check_trade_allowed_at(&request.owner_id, pnl_pct, now)
            .await
        {
            self.bus.publish_error(COMPONENT, rejection.to_string());
            let event = SystemEvent::new(
                COMPONENT,
                EventSeverity::Warning,
                format!("Trade rejected: {rejection}"),
            )
            .with_metadata(json!({
                "owner_id": request.owner_id,
                "symbol": request.symbol,
                "side": request.side.to_string(),
            }));
            if let Err(e) = self.store.record_system_event(&event).await {
                warn!(error = %e, "Failed to persist the rejection event.");
            }
            return Err(rejection.into());
        }

        let context = self
            .machine
            .context_on(&request.owner_id, now.date())
            .await
            .ok_or_else(|| EngineError::MissingContext(request.owner_id.clone()))?;

        let (order, realized_pnl) = match context.mode {
            TradeMode::Paper => {
                let placement = self.paper.place_order(request).await?;
                (placement.order, placement.realized_pnl)
            }
            TradeMode::Live => (self.place_live(request).await?, Decimal::ZERO),
        };

        self.gate
            .record_outcome_at(&request.owner_id, realized_pnl, now)
            .await;
        self.bus.log(
            LogLevel::Info,
            COMPONENT,
            format!(
                "Order routed [{}]: {} {} x{} -> {}",
                context.mode, order.side, order.symbol, order.quantity, order.status
            ),
        );
        Ok(order)
    }

    /// Hands the request to the real broker and keeps a local audit order.
    /// An ack means "accepted onto the book", so the audit order starts OPEN;
    /// the reconciler walks it through the rest of its lifecycle.
    async fn place_live(&self, request: &OrderRequest) -> Result<Order, EngineError> {
        let ack = self.broker.place_order(request).await?;

        let mut order = Order::pending(request, TradeMode::Live);
        order.status = OrderStatus::Open;
        order.broker_order_id = Some(ack.order_id.clone());
        self.store.insert_order(&order).await?;

        info!(
            order_id = %order.order_id,
            broker_order_id = %ack.order_id,
            symbol = %order.symbol,
            "Live order accepted by the broker."
        );
        self.bus.publish_order(order.clone());
        Ok(order)
    }
}
