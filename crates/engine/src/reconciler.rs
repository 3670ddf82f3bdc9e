use std::sync::Arc;
use std::time::Duration;

use broker_client::{BrokerClient, BrokerOrder};
use chrono::Utc;
use core_types::{EventSeverity, Execution, OrderStatus, SystemEvent};
use events::EventBus;
use store::Store;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::EngineError;

const COMPONENT: &str = "reconciler";

/// Translates one status from the broker's vocabulary into our order
/// lifecycle. Unknown strings map to `None` and leave the local order
/// untouched rather than guessing.
pub fn map_broker_status(status: &str) -> Option<OrderStatus> {
    match status {
        "complete" => Some(OrderStatus::Filled),
        "rejected" => Some(OrderStatus::Rejected),
        "cancelled" => Some(OrderStatus::Cancelled),
        "open" => Some(OrderStatus::Open),
        "trigger_pending" => Some(OrderStatus::Pending),
        _ => None,
    }
}

/// The source-of-truth auditor for live orders.
///
/// The broker's order book is authoritative; local audit orders only mirror
/// it. Each sweep fetches the book, maps statuses, and applies whatever
/// changed. The first time an order is seen FILLED, exactly one `Execution`
/// is recorded; the store's per-order existence check is what keeps repeated
/// sweeps (and a sweep interrupted between the two writes) idempotent.
pub struct LiveReconciler {
    store: Arc<dyn Store>,
    broker: Arc<dyn BrokerClient>,
    bus: EventBus,
    owner_id: String,
    interval: Duration,
}

impl LiveReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn BrokerClient>,
        bus: EventBus,
        owner_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            broker,
            bus,
            owner_id: owner_id.into(),
            interval,
        }
    }

    /// One reconciliation sweep. Returns how many local orders changed.
    pub async fn sync_orders(&self) -> Result<usize, EngineError> {
        if !self.broker.has_session() {
            return Ok(0);
        }

        let book = self.broker.order_book().await?;
        let mut updated = 0;
        for broker_order in &book {
            match self.apply(broker_order).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    // One bad row must not starve the rest of the book.
                    error!(
                        broker_order_id = %broker_order.order_id,
                        error = %e,
                        "Failed to reconcile order; will retry next sweep."
                    );
                }
            }
        }
        if updated > 0 {
            info!(updated, "Live reconciliation applied updates.");
        }
        Ok(updated)
    }

    async fn apply(&self, broker_order: &BrokerOrder) -> Result<bool, EngineError> {
        let Some(status) = map_broker_status(&broker_order.status) else {
            warn!(
                broker_order_id = %broker_order.order_id,
                status = %broker_order.status,
                "Unknown broker status; leaving the local order as-is."
            );
            return Ok(false);
        };

        // Orders placed outside this engine appear in the book too; they
        // have no audit row and are not ours to track.
        let Some(mut order) = self
            .store
            .order_by_broker_id(&self.owner_id, &broker_order.order_id)
            .await?
        else {
            return Ok(false);
        };

        let fill_is_new = status == OrderStatus::Filled
            && !self.store.has_execution_for_order(order.order_id).await?;
        if order.status == status && !fill_is_new {
            return Ok(false);
        }

        if order.status != status {
            order.status = status;
            if status == OrderStatus::Filled {
                order.filled_quantity = broker_order.filled_quantity;
                order.average_price = Some(broker_order.average_price);
            }
            order.updated_at = Utc::now();
            self.store.update_order(&order).await?;
            self.bus.publish_order(order.clone());
            info!(
                order_id = %order.order_id,
                broker_order_id = %broker_order.order_id,
                status = %order.status,
                "Live order updated from the broker book."
            );
        }

        if fill_is_new {
            let execution = Execution::for_order(
                &order,
                broker_order.filled_quantity,
                broker_order.average_price,
            );
            self.store.insert_execution(&execution).await?;
            info!(
                order_id = %order.order_id,
                quantity = %execution.quantity,
                price = %execution.price,
                "Execution recorded for live fill."
            );
        }

        let event = SystemEvent::new(
            COMPONENT,
            EventSeverity::Info,
            format!(
                "Live order {} reconciled to {}",
                broker_order.order_id, status
            ),
        );
        if let Err(e) = self.store.record_system_event(&event).await {
            error!(error = %e, "Failed to persist the reconciliation event.");
        }

        Ok(true)
    }

    /// Sweeps the broker book on a fixed cadence until shutdown flips.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sync_orders().await {
                            error!(error = %e, "Live reconciliation sweep failed.");
                        }
                    }
                }
            }
            info!("Live reconciler wound down");
        })
    }
}
