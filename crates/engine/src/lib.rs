//! # Openbell Engine
//!
//! The orchestration layer. This crate owns no domain rule of its own; it
//! wires the state machine, risk gate, market data router, paper broker and
//! live broker client together and keeps the background tasks running: tick
//! consumption, the paper sweep, live order reconciliation and the heartbeat.
//! Every order, whatever its origin, passes through the [`OrderRouter`] so
//! the run-state and risk checks cannot be bypassed.
//!
//! ## Public API
//!
//! A binary constructs an [`Engine`] from configuration plus the injected
//! store and broker client, calls [`Engine::start`], then
//! [`Engine::spawn_tasks`] with a shutdown signal. The individual components
//! are exported for wiring and for tests.

use std::sync::Arc;
use std::time::Duration;

use algo_state::AlgoStateMachine;
use async_trait::async_trait;
use broker_client::BrokerClient;
use configuration::Config;
use core_types::{AlgoDayState, EventSeverity, SystemEvent, TradeMode};
use events::{EventBus, LogLevel};
use executor::PaperBroker;
use market_data::{BrokerFeed, MarketDataRouter, ModeSource, PriceSource, SimulatedFeed};
use risk::RiskGate;
use serde_json::json;
use store::Store;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub mod error;
pub mod heartbeat;
pub mod reconciler;
pub mod router;
pub mod ticks;

// --- Public API ---
pub use error::EngineError;
pub use heartbeat::Heartbeat;
pub use reconciler::{LiveReconciler, map_broker_status};
pub use router::OrderRouter;
pub use ticks::TickRunner;

const COMPONENT: &str = "engine";

/// Answers the market data router's mode question from the owner's locked
/// day. `selected` rather than `is_running` on purpose: a stopped day keeps
/// the feed its mode earned, only an unlocked day falls back.
pub struct LockedModeSource {
    machine: Arc<AlgoStateMachine>,
    owner_id: String,
}

impl LockedModeSource {
    pub fn new(machine: Arc<AlgoStateMachine>, owner_id: impl Into<String>) -> Self {
        Self {
            machine,
            owner_id: owner_id.into(),
        }
    }
}

#[async_trait]
impl ModeSource for LockedModeSource {
    async fn current_mode(&self) -> Option<TradeMode> {
        self.machine
            .selected(&self.owner_id)
            .await
            .map(|(_, mode)| mode)
    }
}

/// The assembled trading engine for one owner.
pub struct Engine {
    config: Config,
    store: Arc<dyn Store>,
    bus: EventBus,
    machine: Arc<AlgoStateMachine>,
    market_data: Arc<MarketDataRouter>,
    paper: Arc<PaperBroker>,
    router: Arc<OrderRouter>,
    reconciler: Arc<LiveReconciler>,
    heartbeat: Arc<Heartbeat>,
    ticks: Arc<TickRunner>,
}

impl Engine {
    /// Wires every component. The store and broker client are injected so
    /// binaries pick the backend and tests substitute doubles.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        broker: Arc<dyn BrokerClient>,
        bus: EventBus,
    ) -> Self {
        let owner_id = config.engine.owner_id.clone();
        let machine = Arc::new(AlgoStateMachine::new(
            store.clone(),
            bus.clone(),
            config.clone(),
        ));
        let gate = Arc::new(RiskGate::new(store.clone(), bus.clone(), &config.risk));

        let broker_feed = Arc::new(BrokerFeed::new(
            bus.clone(),
            broker.clone(),
            config.broker.feed_url.clone(),
            vec![config.engine.symbol.clone()],
            Duration::from_secs(config.market_data.reconnect_delay_secs),
        ));
        let simulated = Arc::new(SimulatedFeed::new(bus.clone(), config.market_data.sim.clone()));
        let mode_source = Arc::new(LockedModeSource::new(machine.clone(), owner_id.clone()));
        let market_data = Arc::new(MarketDataRouter::new(
            broker_feed,
            simulated,
            mode_source,
            store.clone(),
            bus.clone(),
            Duration::from_secs(config.market_data.route_refresh_secs),
        ));

        let paper = Arc::new(PaperBroker::new(
            store.clone(),
            market_data.clone() as Arc<dyn PriceSource>,
            bus.clone(),
            config.paper.clone(),
        ));
        let router = Arc::new(OrderRouter::new(
            store.clone(),
            machine.clone(),
            gate.clone(),
            paper.clone(),
            broker.clone(),
            bus.clone(),
        ));
        let reconciler = Arc::new(LiveReconciler::new(
            store.clone(),
            broker,
            bus.clone(),
            owner_id.clone(),
            Duration::from_secs(config.engine.live_sync_interval_secs),
        ));
        let heartbeat = Arc::new(Heartbeat::new(
            store.clone(),
            machine.clone(),
            bus.clone(),
            owner_id.clone(),
            Duration::from_secs(config.engine.heartbeat_interval_secs),
        ));
        let ticks = Arc::new(TickRunner::new(
            machine.clone(),
            gate,
            router.clone(),
            bus.clone(),
            owner_id,
        ));

        Self {
            config,
            store,
            bus,
            machine,
            market_data,
            paper,
            router,
            reconciler,
            heartbeat,
            ticks,
        }
    }

    /// Resumes any persisted algo day, brings the market data up and writes
    /// the startup audit event.
    pub async fn start(&self) -> Result<(), EngineError> {
        let owner_id = &self.config.engine.owner_id;
        let resumed = self.machine.initialize(owner_id).await?;
        match &resumed {
            Some(state) => info!(
                "Resuming algo day: {} ({}) {:?}",
                state.algo, state.mode, state.status
            ),
            None => info!("No algo day persisted for {owner_id}; engine starts idle."),
        }

        self.market_data.start().await?;

        let message = "Engine started";
        self.bus.log(LogLevel::Info, COMPONENT, message);
        let event = SystemEvent::new(COMPONENT, EventSeverity::Info, message).with_metadata(
            json!({ "owner_id": owner_id, "symbol": self.config.engine.symbol }),
        );
        self.store.record_system_event(&event).await?;
        Ok(())
    }

    /// Locks the named algo in for today on the configured owner.
    pub async fn lock_algo(
        &self,
        algo: &str,
        mode: TradeMode,
    ) -> Result<AlgoDayState, EngineError> {
        let state = self
            .machine
            .lock(&self.config.engine.owner_id, algo, mode)
            .await?;
        Ok(state)
    }

    /// Starts every background task. The returned handles complete once the
    /// shutdown signal flips to `true`.
    pub fn spawn_tasks(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            self.market_data.clone().spawn_route_loop(shutdown.clone()),
            spawn_paper_sweep(
                self.paper.clone(),
                Duration::from_secs(self.config.engine.paper_sweep_interval_secs),
                shutdown.clone(),
            ),
            self.reconciler.clone().spawn(shutdown.clone()),
            self.heartbeat.clone().spawn(shutdown.clone()),
            self.ticks.clone().spawn(shutdown.clone()),
        ]
    }

    /// Direct order entry, same gauntlet as strategy-originated orders.
    pub async fn place_order(
        &self,
        request: &core_types::OrderRequest,
    ) -> Result<core_types::Order, EngineError> {
        self.router.place_order(request).await
    }

    /// Stops the feeds and writes the shutdown audit event. The algo day is
    /// left untouched so a restart resumes it.
    pub async fn shutdown(&self) {
        self.market_data.stop().await;

        let message = "Engine stopped";
        self.bus.log(LogLevel::Info, COMPONENT, message);
        let event = SystemEvent::new(COMPONENT, EventSeverity::Info, message);
        if let Err(e) = self.store.record_system_event(&event).await {
            error!(error = %e, "Failed to record the engine stop.");
        }
    }
}

/// Sweeps pending paper orders against the current price on a fixed cadence.
pub fn spawn_paper_sweep(
    paper: Arc<PaperBroker>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match paper.sync_pending_orders().await {
                        Ok(fills) if !fills.is_empty() => {
                            info!(count = fills.len(), "Paper sweep filled pending orders.");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Paper sweep failed."),
                    }
                }
            }
        }
        info!("Paper sweep wound down");
    })
}
