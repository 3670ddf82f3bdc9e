use crate::Strategy;
use crate::error::StrategyError;
use configuration::VwapMomentumParams;
use core_types::{AlgoId, MarketTick, OrderSide, RiskLimits};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Which side of the VWAP band the last evaluated price sat on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Inside,
    Above,
    Below,
}

/// The session-VWAP momentum strategy.
///
/// Tracks a volume-weighted average price for the trading day and trades
/// breakouts through a buffer band around it: a close above `VWAP + buffer`
/// signals long, below `VWAP - buffer` signals short. Signals are
/// edge-triggered on the band crossing, so sitting above the band does not
/// refire every tick.
pub struct VwapMomentum {
    symbol: String,
    params: VwapMomentumParams,
    active: bool,
    // Ticks carry no volume, so each tick weighs equally and the session
    // VWAP reduces to a running mean of traded prices.
    ticks_seen: u32,
    cumulative_price: Decimal,
    vwap: Decimal,
    zone: Zone,
}

impl VwapMomentum {
    /// Creates a new `VwapMomentum` instance with the given parameters.
    ///
    /// It performs validation to ensure the parameters are logical.
    pub fn new(params: VwapMomentumParams, symbol: String) -> Result<Self, StrategyError> {
        if params.buffer_pct <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameters(
                "buffer_pct must be positive".to_string(),
            ));
        }
        if params.min_warmup_ticks == 0 {
            return Err(StrategyError::InvalidParameters(
                "min_warmup_ticks must be at least 1".to_string(),
            ));
        }
        if params.order_quantity <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameters(
                "order_quantity must be positive".to_string(),
            ));
        }

        Ok(Self {
            symbol,
            params,
            active: false,
            ticks_seen: 0,
            cumulative_price: Decimal::ZERO,
            vwap: Decimal::ZERO,
            zone: Zone::Inside,
        })
    }
}

impl Strategy for VwapMomentum {
    fn algo(&self) -> AlgoId {
        AlgoId::VwapMomentum
    }

    fn start(&mut self) {
        self.active = true;
        tracing::info!("VwapMomentum: started for {}", self.symbol);
    }

    fn stop(&mut self) {
        self.active = false;
        tracing::info!("VwapMomentum: stopped for {}", self.symbol);
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn validate_market(&self, tick: &MarketTick) -> bool {
        tick.symbol == self.symbol && tick.price > Decimal::ZERO
    }

    /// Folds the tick into the session VWAP, then looks for a transition
    /// into the region above or below the buffer band.
    fn generate_signal(&mut self, tick: &MarketTick) -> Option<OrderSide> {
        self.ticks_seen += 1;
        self.cumulative_price += tick.price;
        self.vwap = self.cumulative_price / Decimal::from(self.ticks_seen);

        // The VWAP is meaningless on a handful of ticks. Zone tracking also
        // waits, so a price already beyond the band fires on the first tick
        // after warm-up.
        if self.ticks_seen < self.params.min_warmup_ticks {
            return None;
        }

        let band = self.vwap * self.params.buffer_pct / dec!(100);
        let zone = if tick.price > self.vwap + band {
            Zone::Above
        } else if tick.price < self.vwap - band {
            Zone::Below
        } else {
            Zone::Inside
        };

        let crossed = zone != self.zone;
        self.zone = zone;
        if !crossed {
            return None;
        }

        match zone {
            Zone::Above => {
                tracing::info!(
                    "VwapMomentum: LTP {} broke above VWAP {} band, signaling BUY",
                    tick.price,
                    self.vwap.round_dp(2)
                );
                Some(OrderSide::Buy)
            }
            Zone::Below => {
                tracing::info!(
                    "VwapMomentum: LTP {} broke below VWAP {} band, signaling SELL",
                    tick.price,
                    self.vwap.round_dp(2)
                );
                Some(OrderSide::Sell)
            }
            Zone::Inside => None,
        }
    }

    fn size_position(&self, _side: OrderSide, _limits: &RiskLimits) -> Decimal {
        self.params.order_quantity
    }
}
