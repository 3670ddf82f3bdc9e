use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use configuration::SimFeedSettings;
use core_types::{MarketTick, TickSource};
use events::EventBus;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tokio::sync::{Mutex, RwLock, watch};

use crate::adapter::{FeedAdapter, PriceCache, Pump, stop_pump};
use crate::error::MarketDataError;

/// Synthetic market data: a bounded random walk per configured symbol.
///
/// Each interval every symbol steps by a uniformly random percentage within
/// `±max_step_pct` of its current price, starting from the configured seed.
/// Ticks are cached and published exactly like real ones, marked
/// `TickSource::Simulated`.
pub struct SimulatedFeed {
    bus: EventBus,
    settings: SimFeedSettings,
    cache: PriceCache,
    pump: Mutex<Option<Pump>>,
}

impl SimulatedFeed {
    pub fn new(bus: EventBus, settings: SimFeedSettings) -> Self {
        Self {
            bus,
            settings,
            cache: Arc::new(RwLock::new(HashMap::new())),
            pump: Mutex::new(None),
        }
    }
}

fn random_step(max_pct: f64) -> f64 {
    if max_pct <= 0.0 {
        return 0.0;
    }
    rand::thread_rng().gen_range(-max_pct..=max_pct)
}

#[async_trait]
impl FeedAdapter for SimulatedFeed {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn source(&self) -> TickSource {
        TickSource::Simulated
    }

    async fn start(&self) -> Result<(), MarketDataError> {
        let mut slot = self.pump.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let bus = self.bus.clone();
        let cache = self.cache.clone();
        let interval = Duration::from_millis(self.settings.tick_interval_ms);
        let max_step = self.settings.max_step_pct.to_f64().unwrap_or(0.0);
        let mut prices = self.settings.seed_prices.clone();

        let task = tokio::spawn(async move {
            tracing::info!("Starting market data simulation...");
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        for (symbol, price) in prices.iter_mut() {
                            let step_pct = random_step(max_step);
                            let factor = Decimal::from_f64(1.0 + step_pct / 100.0)
                                .unwrap_or(Decimal::ONE);
                            *price = (*price * factor).round_dp(2);
                            let tick =
                                MarketTick::new(symbol.clone(), *price, TickSource::Simulated);
                            cache.write().await.insert(symbol.clone(), tick.clone());
                            bus.publish_tick(tick);
                        }
                    }
                }
            }
            tracing::info!("Market data simulation wound down");
        });

        *slot = Some(Pump {
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    async fn stop(&self) {
        stop_pump(&self.pump, self.name()).await;
    }

    async fn latest_price(&self, symbol: &str) -> Option<MarketTick> {
        self.cache.read().await.get(symbol).cloned()
    }

    /// The seed price doubles as the snapshot, so a symbol is priceable
    /// before the first synthetic tick lands.
    async fn snapshot_price(&self, symbol: &str) -> Option<Decimal> {
        self.settings.seed_prices.get(symbol).copied()
    }
}
