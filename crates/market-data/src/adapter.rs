use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use core_types::{MarketTick, TickSource};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use crate::error::MarketDataError;

/// Last tick per symbol, shared between a feed's pump task and its readers.
pub type PriceCache = Arc<RwLock<HashMap<String, MarketTick>>>;

/// A running feed's background machinery: the shutdown signal and the pump
/// task it controls.
pub(crate) struct Pump {
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

/// Signals a pump to stop and waits for it to wind down.
pub(crate) async fn stop_pump(slot: &Mutex<Option<Pump>>, name: &str) {
    let pump = slot.lock().await.take();
    if let Some(pump) = pump {
        let _ = pump.shutdown.send(true);
        if let Err(err) = pump.task.await {
            tracing::error!("{name} feed task ended abnormally: {err}");
        }
        tracing::info!("{name} feed stopped");
    }
}

/// One source of market ticks.
///
/// An adapter owns a cache of the last tick per symbol and publishes every
/// tick it produces on the event bus. `start` is idempotent while running;
/// `stop` tears the pump down and waits for it.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn source(&self) -> TickSource;

    async fn start(&self) -> Result<(), MarketDataError>;

    async fn stop(&self);

    /// The last tick the pump cached for the symbol.
    async fn latest_price(&self, symbol: &str) -> Option<MarketTick>;

    /// An out-of-band price lookup for when the cache has nothing, e.g. a
    /// REST quote call or a configured seed.
    async fn snapshot_price(&self, symbol: &str) -> Option<Decimal>;
}
