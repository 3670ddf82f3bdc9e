use core_types::{MarketTick, Order};
use tokio::sync::broadcast;
use tracing::trace;

use crate::messages::{AlgoStatusUpdate, Diagnostic, ErrorMessage, LogLevel, LogMessage};

/// Default depth of each topic channel before slow subscribers start
/// lagging.
pub const DEFAULT_CAPACITY: usize = 1024;

/// The in-process publish/subscribe fabric.
///
/// One broadcast channel per topic family: market ticks, order updates, and
/// diagnostics. Publishing is best-effort: a topic with no subscribers drops
/// the message, and a slow subscriber lags on its own receiver without ever
/// blocking the publisher or its peers.
#[derive(Clone)]
pub struct EventBus {
    ticks: broadcast::Sender<MarketTick>,
    orders: broadcast::Sender<Order>,
    diagnostics: broadcast::Sender<Diagnostic>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (ticks, _) = broadcast::channel(capacity);
        let (orders, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        Self {
            ticks,
            orders,
            diagnostics,
        }
    }

    pub fn subscribe_ticks(&self) -> broadcast::Receiver<MarketTick> {
        self.ticks.subscribe()
    }

    pub fn subscribe_orders(&self) -> broadcast::Receiver<Order> {
        self.orders.subscribe()
    }

    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }

    pub fn publish_tick(&self, tick: MarketTick) {
        if self.ticks.send(tick).is_err() {
            trace!("tick published with no subscribers");
        }
    }

    pub fn publish_order(&self, order: Order) {
        if self.orders.send(order).is_err() {
            trace!("order update published with no subscribers");
        }
    }

    pub fn publish_diagnostic(&self, diagnostic: Diagnostic) {
        if self.diagnostics.send(diagnostic).is_err() {
            trace!("diagnostic published with no subscribers");
        }
    }

    /// Shorthand for publishing a `SystemLog` diagnostic.
    pub fn log(&self, level: LogLevel, component: &str, message: impl Into<String>) {
        self.publish_diagnostic(Diagnostic::SystemLog(LogMessage::new(
            level, component, message,
        )));
    }

    /// Shorthand for publishing an `Error` diagnostic.
    pub fn publish_error(&self, component: &str, message: impl Into<String>) {
        self.publish_diagnostic(Diagnostic::Error(ErrorMessage {
            timestamp: chrono::Utc::now(),
            component: component.to_string(),
            message: message.into(),
        }));
    }

    /// Shorthand for publishing an `AlgoStatus` diagnostic.
    pub fn publish_algo_status(&self, update: AlgoStatusUpdate) {
        self.publish_diagnostic(Diagnostic::AlgoStatus(update));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::TickSource;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn delivers_ticks_to_all_subscribers() {
        let bus = EventBus::new(16);
        let mut rx_a = bus.subscribe_ticks();
        let mut rx_b = bus.subscribe_ticks();

        bus.publish_tick(MarketTick::new("NIFTY 50", dec!(22000), TickSource::Simulated));

        assert_eq!(rx_a.recv().await.map(|t| t.price), Ok(dec!(22000)));
        assert_eq!(rx_b.recv().await.map(|t| t.price), Ok(dec!(22000)));
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_affect_peers() {
        let bus = EventBus::new(16);
        let rx_gone = bus.subscribe_ticks();
        let mut rx_live = bus.subscribe_ticks();
        drop(rx_gone);

        bus.publish_tick(MarketTick::new("NIFTY 50", dec!(22010), TickSource::Simulated));

        let tick = rx_live.recv().await.unwrap();
        assert_eq!(tick.price, dec!(22010));
    }

    #[tokio::test]
    async fn preserves_publish_order_per_symbol() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_ticks();

        for price in [dec!(100), dec!(101), dec!(102)] {
            bus.publish_tick(MarketTick::new("NIFTY BANK", price, TickSource::Simulated));
        }

        assert_eq!(rx.recv().await.unwrap().price, dec!(100));
        assert_eq!(rx.recv().await.unwrap().price, dec!(101));
        assert_eq!(rx.recv().await.unwrap().price, dec!(102));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(16);
        bus.log(LogLevel::Info, "test", "nobody is listening");
        bus.publish_error("test", "still nobody");
    }
}
