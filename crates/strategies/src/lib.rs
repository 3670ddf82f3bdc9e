//! # Openbell Strategy Library
//!
//! This crate contains the intraday trading logic for the Openbell system. It
//! defines a universal `Strategy` trait and provides the concrete implementations
//! behind each `AlgoId`.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of
//!   persistence, brokers, or execution. It depends only on `core-types` and
//!   `configuration`.
//! - **Closed Registry:** Every tradable strategy is a variant of `AlgoId`.
//!   The `create_strategy` factory matches exhaustively, so adding a strategy
//!   without wiring it up is a compile error, and an unrecognized name can
//!   never reach the engine.
//! - **Sandboxed Signals:** A strategy only ever emits a `TradeIntent`. It
//!   cannot place orders, touch wallets, or mutate positions; the engine owns
//!   all of that.
//!
//! ## Public API
//!
//! The primary public components are:
//! - `Strategy`: The core trait all strategies implement.
//! - `create_strategy`: The factory function to construct a strategy instance.
//! - The concrete strategy structs themselves (e.g., `VwapMomentum`).

// Declare all the modules that constitute this crate.
pub mod error;
pub mod factory;
pub mod opening_range;
pub mod vwap_momentum;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use factory::create_strategy;
pub use opening_range::OpeningRange;
pub use vwap_momentum::VwapMomentum;

// Re-export AlgoId from core_types; it is the registry key for this crate.
pub use core_types::AlgoId;

use core_types::{MarketTick, OrderSide, RiskLimits, TradeIntent};
use rust_decimal::Decimal;

/// The core trait that all trading strategies must implement.
///
/// The lifecycle is owned by the engine: a strategy is constructed by the
/// factory, `start`ed when its algo day is locked, fed ticks through
/// `on_tick`, and `stop`ped on shutdown. While inactive it emits nothing.
///
/// The `&mut self` in `generate_signal` is crucial, as strategies maintain
/// internal state between ticks (accumulated VWAP, range highs, previous
/// zone). The `Send + Sync` bounds are required so a boxed strategy can live
/// behind the engine's shared handles.
pub trait Strategy: Send + Sync {
    /// Which registry member this instance is.
    fn algo(&self) -> AlgoId;

    /// Arms the strategy so `on_tick` starts evaluating.
    fn start(&mut self);

    /// Disarms the strategy. Internal state is retained; the next day gets a
    /// fresh instance anyway.
    fn stop(&mut self);

    fn is_active(&self) -> bool;

    /// Checks whether the tick is one this strategy should act on at all
    /// (right symbol, sane price). Ticks that fail are not fed to the signal
    /// logic and do not advance internal state.
    fn validate_market(&self, tick: &MarketTick) -> bool;

    /// Core logic: folds the tick into internal state and decides whether a
    /// trade should be opened right now, and in which direction.
    fn generate_signal(&mut self, tick: &MarketTick) -> Option<OrderSide>;

    /// Converts a directional signal into a quantity, given the current risk
    /// limits. Returning zero suppresses the trade.
    fn size_position(&self, side: OrderSide, limits: &RiskLimits) -> Decimal;

    /// Main entry point called by the engine on every tick. Composes the
    /// three steps above; implementors normally leave this alone.
    fn on_tick(&mut self, tick: &MarketTick, limits: &RiskLimits) -> Option<TradeIntent> {
        if !self.is_active() || !self.validate_market(tick) {
            return None;
        }
        let side = self.generate_signal(tick)?;
        let quantity = self.size_position(side, limits);
        if quantity <= Decimal::ZERO {
            return None;
        }
        Some(TradeIntent {
            symbol: tick.symbol.clone(),
            side,
            quantity,
        })
    }
}
