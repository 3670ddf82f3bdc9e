use std::sync::Arc;
use std::time::Duration;

use algo_state::AlgoStateMachine;
use core_types::{EventSeverity, SystemEvent};
use events::{EventBus, LogLevel};
use serde_json::json;
use store::Store;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

const COMPONENT: &str = "health";

/// Periodic liveness beacon.
///
/// Writes one audit event per interval recording whether the owner's algo is
/// running, so an operator reading the event stream can tell "engine idle"
/// apart from "engine gone".
pub struct Heartbeat {
    store: Arc<dyn Store>,
    machine: Arc<AlgoStateMachine>,
    bus: EventBus,
    owner_id: String,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(
        store: Arc<dyn Store>,
        machine: Arc<AlgoStateMachine>,
        bus: EventBus,
        owner_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            machine,
            bus,
            owner_id: owner_id.into(),
            interval,
        }
    }

    pub async fn beat(&self) {
        let running = self.machine.is_running(&self.owner_id).await;
        let message = format!("Engine heartbeat (algo running: {running})");
        info!("{message}");
        self.bus.log(LogLevel::Info, COMPONENT, &message);

        let event = SystemEvent::new(COMPONENT, EventSeverity::Info, &message).with_metadata(
            json!({ "owner_id": self.owner_id, "algo_running": running }),
        );
        // A missed heartbeat row is worth a log line, never a dead task.
        if let Err(e) = self.store.record_system_event(&event).await {
            error!(error = %e, "Failed to persist heartbeat event.");
        }
    }

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
                    _ = ticker.tick() => self.beat().await,
                }
            }
            info!("Heartbeat wound down");
        })
    }
}
