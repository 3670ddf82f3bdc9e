//! # Openbell Market Data
//!
//! This crate owns every price the engine sees. Two feed adapters sit behind
//! one router: the broker's WebSocket quote stream for real prices and a
//! bounded random-walk simulation for everything else. The router re-checks
//! which feed the day's trade mode deserves and switches without dropping
//! price availability, caching the last tick per symbol either way.
//!
//! ## Public API
//!
//! Consumers take prices through the [`PriceSource`] trait and leave the
//! feed lifecycle to [`MarketDataRouter`]. The adapters themselves are
//! exported for wiring, not for direct use.

use async_trait::async_trait;
use rust_decimal::Decimal;

pub mod adapter;
pub mod broker_feed;
pub mod error;
pub mod router;
pub mod simulated;

// --- Public API ---
pub use adapter::{FeedAdapter, PriceCache};
pub use broker_feed::BrokerFeed;
pub use error::MarketDataError;
pub use router::{FeedKind, MarketDataRouter, ModeSource, select_feed};
pub use simulated::SimulatedFeed;

/// The one question the rest of the engine asks this crate.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Last traded price for the symbol, from whichever feed is active.
    async fn get_ltp(&self, symbol: &str) -> Result<Decimal, MarketDataError>;
}
