use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker_client::BrokerClient;
use core_types::{MarketTick, TickSource};
use events::EventBus;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::adapter::{FeedAdapter, PriceCache, Pump, stop_pump};
use crate::error::MarketDataError;

/// One quote frame off the broker's stream.
#[derive(Debug, Deserialize)]
struct QuoteMessage {
    symbol: String,
    ltp: Decimal,
}

/// Real market data from the broker's WebSocket quote stream.
///
/// The pump holds the connection open, re-establishing it after a fixed
/// delay whenever it drops, until told to stop. Snapshot prices come from
/// the broker's REST quote endpoint instead, so a price is available even
/// between stream reconnects.
pub struct BrokerFeed {
    bus: EventBus,
    client: Arc<dyn BrokerClient>,
    feed_url: String,
    symbols: Vec<String>,
    reconnect_delay: Duration,
    cache: PriceCache,
    pump: Mutex<Option<Pump>>,
}

impl BrokerFeed {
    pub fn new(
        bus: EventBus,
        client: Arc<dyn BrokerClient>,
        feed_url: String,
        symbols: Vec<String>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            bus,
            client,
            feed_url,
            symbols,
            reconnect_delay,
            cache: Arc::new(RwLock::new(HashMap::new())),
            pump: Mutex::new(None),
        }
    }

    pub fn has_session(&self) -> bool {
        self.client.has_session()
    }

    /// Subscription URL for the day's session. Index symbols carry spaces,
    /// which are not valid in a query string.
    fn stream_url(&self, token: &str) -> String {
        let symbols = self.symbols.join(",").replace(' ', "%20");
        format!("{}?token={}&symbols={}", self.feed_url, token, symbols)
    }
}

async fn handle_frame(text: &str, cache: &PriceCache, bus: &EventBus) {
    match serde_json::from_str::<QuoteMessage>(text) {
        Ok(quote) => {
            let tick = MarketTick::new(quote.symbol.clone(), quote.ltp, TickSource::Broker);
            cache.write().await.insert(quote.symbol, tick.clone());
            bus.publish_tick(tick);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unparseable quote frame.");
        }
    }
}

#[async_trait]
impl FeedAdapter for BrokerFeed {
    fn name(&self) -> &'static str {
        "broker"
    }

    fn source(&self) -> TickSource {
        TickSource::Broker
    }

    async fn start(&self) -> Result<(), MarketDataError> {
        let token = self
            .client
            .session_token()
            .ok_or(MarketDataError::NoSession)?;

        let mut slot = self.pump.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let url = self.stream_url(&token);
        let bus = self.bus.clone();
        let cache = self.cache.clone();
        let reconnect_delay = self.reconnect_delay;

        let task = tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tracing::info!("Connecting to broker quote stream...");
                match connect_async(url.as_str()).await {
                    Ok((mut stream, _)) => {
                        tracing::info!("Broker quote stream established.");
                        loop {
                            tokio::select! {
                                biased;
                                _ = shutdown_rx.changed() => {
                                    if *shutdown_rx.borrow() {
                                        return;
                                    }
                                }
                                msg = stream.next() => match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        handle_frame(&text, &cache, &bus).await;
                                    }
                                    Some(Ok(Message::Close(frame))) => {
                                        tracing::info!(?frame, "Broker quote stream closed by server.");
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        tracing::error!(error = %e, "Broker quote stream error.");
                                        break;
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to connect to broker quote stream.");
                    }
                }
                tracing::warn!(
                    "Broker quote stream disconnected. Reconnecting in {}s...",
                    reconnect_delay.as_secs()
                );
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
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

    /// REST snapshot, used when the stream has not produced a price yet.
    async fn snapshot_price(&self, symbol: &str) -> Option<Decimal> {
        match self.client.quotes(&[symbol.to_string()]).await {
            Ok(mut quotes) => quotes.remove(symbol),
            Err(e) => {
                tracing::error!(error = %e, symbol, "Quote snapshot failed.");
                None
            }
        }
    }
}
