use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use core_types::{EventSeverity, SystemEvent, TradeMode};
use events::{EventBus, LogLevel};
use rust_decimal::Decimal;
use store::Store;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use crate::PriceSource;
use crate::adapter::FeedAdapter;
use crate::broker_feed::BrokerFeed;
use crate::error::MarketDataError;
use crate::simulated::SimulatedFeed;

const COMPONENT: &str = "market_data";

/// Which adapter currently feeds the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Broker,
    Simulated,
}

/// The routing rule, kept as a plain function so it can be stated in one
/// place: live trading always wants the real feed, paper trading takes it
/// when a session exists, and before any lock the simulation runs.
pub fn select_feed(mode: Option<TradeMode>, has_session: bool) -> FeedKind {
    match mode {
        Some(TradeMode::Live) => FeedKind::Broker,
        Some(TradeMode::Paper) if has_session => FeedKind::Broker,
        Some(TradeMode::Paper) | None => FeedKind::Simulated,
    }
}

/// Where the router learns the day's trade mode. The algo state machine is
/// the production answer; tests substitute a fixed one.
#[async_trait]
pub trait ModeSource: Send + Sync {
    async fn current_mode(&self) -> Option<TradeMode>;
}

/// Owns both feed adapters and keeps the right one running.
///
/// The simulated feed is the fallback: it comes up first and stays
/// authoritative until a routing pass successfully brings the broker feed
/// up. A failed broker start never takes a working feed down.
pub struct MarketDataRouter {
    broker: Arc<BrokerFeed>,
    simulated: Arc<SimulatedFeed>,
    mode_source: Arc<dyn ModeSource>,
    store: Arc<dyn Store>,
    bus: EventBus,
    active: RwLock<FeedKind>,
    refresh_interval: Duration,
}

impl MarketDataRouter {
    pub fn new(
        broker: Arc<BrokerFeed>,
        simulated: Arc<SimulatedFeed>,
        mode_source: Arc<dyn ModeSource>,
        store: Arc<dyn Store>,
        bus: EventBus,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            broker,
            simulated,
            mode_source,
            store,
            bus,
            active: RwLock::new(FeedKind::Simulated),
            refresh_interval,
        }
    }

    pub async fn active_feed(&self) -> FeedKind {
        *self.active.read().await
    }

    /// Brings the fallback feed up, then runs one routing pass.
    pub async fn start(&self) -> Result<(), MarketDataError> {
        self.simulated.start().await?;
        *self.active.write().await = FeedKind::Simulated;
        self.evaluate_route().await;
        Ok(())
    }

    pub async fn stop(&self) {
        self.broker.stop().await;
        self.simulated.stop().await;
    }

    fn adapter(&self, kind: FeedKind) -> &dyn FeedAdapter {
        match kind {
            FeedKind::Broker => self.broker.as_ref(),
            FeedKind::Simulated => self.simulated.as_ref(),
        }
    }

    /// One routing pass: work out the desired feed and switch if it differs
    /// from the active one. The new feed must be running before the old one
    /// stops, so prices keep flowing through a failed switch.
    pub async fn evaluate_route(&self) {
        let mode = self.mode_source.current_mode().await;
        let desired = select_feed(mode, self.broker.has_session());
        let current = *self.active.read().await;
        if desired == current {
            return;
        }

        if let Err(e) = self.adapter(desired).start().await {
            tracing::error!(
                error = %e,
                "Cannot bring up the {} feed; staying on {}.",
                self.adapter(desired).name(),
                self.adapter(current).name()
            );
            return;
        }
        self.adapter(current).stop().await;
        *self.active.write().await = desired;

        let message = format!(
            "Market data feed switched from {} to {}",
            self.adapter(current).name(),
            self.adapter(desired).name()
        );
        tracing::info!("{message}");
        self.bus.log(LogLevel::Info, COMPONENT, message.as_str());
        let event = SystemEvent::new(COMPONENT, EventSeverity::Info, message);
        if let Err(e) = self.store.record_system_event(&event).await {
            tracing::error!(error = %e, "Failed to record the feed switch.");
        }
    }

    /// Re-evaluates the route on a fixed cadence until shutdown flips.
    pub fn spawn_route_loop(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.refresh_interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.evaluate_route().await;
                    }
                }
            }
            tracing::info!("Market data route loop wound down");
        })
    }
}

#[async_trait]
impl PriceSource for MarketDataRouter {
    /// Last traded price from the active feed: cached tick first, snapshot
    /// second.
    async fn get_ltp(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        let active = *self.active.read().await;
        let adapter = self.adapter(active);
        if let Some(tick) = adapter.latest_price(symbol).await {
            return Ok(tick.price);
        }
        if let Some(price) = adapter.snapshot_price(symbol).await {
            return Ok(price);
        }
        Err(MarketDataError::Unavailable(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use broker_client::{BrokerClient, BrokerError, BrokerOrder, BrokerOrderAck};
    use configuration::SimFeedSettings;
    use core_types::OrderRequest;
    use events::Diagnostic;
    use rust_decimal_macros::dec;
    use store::MemoryStore;
    use tokio::sync::Mutex;

    struct FixedMode(Option<TradeMode>);

    #[async_trait]
    impl ModeSource for FixedMode {
        async fn current_mode(&self) -> Option<TradeMode> {
            self.0
        }
    }

    struct SwitchingMode(Mutex<Option<TradeMode>>);

    #[async_trait]
    impl ModeSource for SwitchingMode {
        async fn current_mode(&self) -> Option<TradeMode> {
            *self.0.lock().await
        }
    }

    struct StubBroker {
        token: Option<String>,
    }

    #[async_trait]
    impl BrokerClient for StubBroker {
        fn has_session(&self) -> bool {
            self.token.is_some()
        }

        fn session_token(&self) -> Option<String> {
            self.token.clone()
        }

        async fn place_order(&self, _: &OrderRequest) -> Result<BrokerOrderAck, BrokerError> {
            Err(BrokerError::NoSession)
        }

        async fn order_book(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
            Ok(Vec::new())
        }

        async fn quotes(&self, _: &[String]) -> Result<HashMap<String, Decimal>, BrokerError> {
            Ok(HashMap::new())
        }
    }

    fn make_parts(
        mode_source: Arc<dyn ModeSource>,
        token: Option<&str>,
        refresh: Duration,
    ) -> (Arc<MarketDataRouter>, Arc<MemoryStore>) {
        let bus = EventBus::new(64);
        let client = Arc::new(StubBroker {
            token: token.map(str::to_string),
        });
        let broker = Arc::new(BrokerFeed::new(
            bus.clone(),
            client,
            "ws://127.0.0.1:9/quotes".to_string(),
            vec!["NIFTY 50".to_string()],
            Duration::from_secs(1),
        ));
        let simulated = Arc::new(SimulatedFeed::new(
            bus.clone(),
            SimFeedSettings {
                tick_interval_ms: 10,
                max_step_pct: dec!(0.25),
                seed_prices: HashMap::from([("NIFTY 50".to_string(), dec!(22000))]),
            },
        ));
        let store = Arc::new(MemoryStore::new());
        let router = Arc::new(MarketDataRouter::new(
            broker,
            simulated,
            mode_source,
            store.clone(),
            bus,
            refresh,
        ));
        (router, store)
    }

    fn make_router(
        mode: Option<TradeMode>,
        token: Option<&str>,
    ) -> (Arc<MarketDataRouter>, Arc<MemoryStore>) {
        make_parts(Arc::new(FixedMode(mode)), token, Duration::from_secs(60))
    }

    #[test]
    fn routing_rule_truth_table() {
        assert_eq!(select_feed(Some(TradeMode::Live), true), FeedKind::Broker);
        assert_eq!(select_feed(Some(TradeMode::Live), false), FeedKind::Broker);
        assert_eq!(select_feed(Some(TradeMode::Paper), true), FeedKind::Broker);
        assert_eq!(
            select_feed(Some(TradeMode::Paper), false),
            FeedKind::Simulated
        );
        assert_eq!(select_feed(None, true), FeedKind::Simulated);
        assert_eq!(select_feed(None, false), FeedKind::Simulated);
    }

    #[tokio::test]
    async fn starts_on_the_simulated_feed() {
        let (router, _store) = make_router(None, None);
        router.start().await.unwrap();
        assert_eq!(router.active_feed().await, FeedKind::Simulated);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let price = router.get_ltp("NIFTY 50").await.unwrap();
        assert!(price > dec!(21000) && price < dec!(23000));
        router.stop().await;
    }

    #[tokio::test]
    async fn snapshot_serves_prices_before_the_first_tick() {
        let (router, _store) = make_router(None, None);
        // Never started: the cache is empty, so the seed price answers.
        assert_eq!(router.get_ltp("NIFTY 50").await.unwrap(), dec!(22000));
        assert!(matches!(
            router.get_ltp("UNKNOWN").await,
            Err(MarketDataError::Unavailable(symbol)) if symbol == "UNKNOWN"
        ));
    }

    #[tokio::test]
    async fn live_mode_without_a_session_stays_on_sim() {
        let (router, _store) = make_router(Some(TradeMode::Live), None);
        router.start().await.unwrap();
        assert_eq!(router.active_feed().await, FeedKind::Simulated);
        router.stop().await;
    }

    #[tokio::test]
    async fn paper_mode_with_a_session_switches_to_the_broker_feed() {
        let (router, store) = make_router(Some(TradeMode::Paper), Some("tok-123"));
        let mut diagnostics = router.bus.subscribe_diagnostics();
        router.start().await.unwrap();

        assert_eq!(router.active_feed().await, FeedKind::Broker);
        assert_eq!(store.system_event_count().await, 1);

        let diag = diagnostics.recv().await.unwrap();
        match diag {
            Diagnostic::SystemLog(log) => {
                assert_eq!(log.component, "market_data");
                assert!(log.message.contains("simulated"));
                assert!(log.message.contains("broker"));
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
        router.stop().await;
    }

    #[tokio::test]
    async fn route_loop_picks_up_a_mode_change() {
        let mode = Arc::new(SwitchingMode(Mutex::new(None)));
        let (router, _store) =
            make_parts(mode.clone(), Some("tok-123"), Duration::from_millis(20));
        router.start().await.unwrap();
        assert_eq!(router.active_feed().await, FeedKind::Simulated);

        *mode.0.lock().await = Some(TradeMode::Live);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = router.clone().spawn_route_loop(shutdown_rx);

        let mut switched = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if router.active_feed().await == FeedKind::Broker {
                switched = true;
                break;
            }
        }
        assert!(switched, "route loop never switched feeds");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        router.stop().await;
    }
}
