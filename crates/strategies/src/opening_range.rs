use crate::Strategy;
use crate::error::StrategyError;
use configuration::OpeningRangeParams;
use core_types::{AlgoId, MarketTick, OrderSide, RiskLimits};
use rust_decimal::Decimal;

/// The opening-range breakout strategy.
///
/// The first `window_ticks` ticks of the session establish a high/low range.
/// Once the window closes, a trade above the range high signals long and a
/// trade below the range low signals short. Each direction fires at most once
/// per session; instances are rebuilt daily, so there is no carry-over.
pub struct OpeningRange {
    symbol: String,
    params: OpeningRangeParams,
    active: bool,
    ticks_seen: u32,
    range_high: Option<Decimal>,
    range_low: Option<Decimal>,
    long_fired: bool,
    short_fired: bool,
}

impl OpeningRange {
    /// Creates a new `OpeningRange` instance with the given parameters.
    pub fn new(params: OpeningRangeParams, symbol: String) -> Result<Self, StrategyError> {
        if params.window_ticks == 0 {
            return Err(StrategyError::InvalidParameters(
                "window_ticks must be at least 1".to_string(),
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
            range_high: None,
            range_low: None,
            long_fired: false,
            short_fired: false,
        })
    }
}

impl Strategy for OpeningRange {
    fn algo(&self) -> AlgoId {
        AlgoId::OpeningRange
    }

    fn start(&mut self) {
        self.active = true;
        tracing::info!("OpeningRange: started for {}", self.symbol);
    }

    fn stop(&mut self) {
        self.active = false;
        tracing::info!("OpeningRange: stopped for {}", self.symbol);
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn validate_market(&self, tick: &MarketTick) -> bool {
        tick.symbol == self.symbol && tick.price > Decimal::ZERO
    }

    fn generate_signal(&mut self, tick: &MarketTick) -> Option<OrderSide> {
        self.ticks_seen += 1;

        // Window still open: extend the range, never trade.
        if self.ticks_seen <= self.params.window_ticks {
            self.range_high = Some(match self.range_high {
                Some(high) => high.max(tick.price),
                None => tick.price,
            });
            self.range_low = Some(match self.range_low {
                Some(low) => low.min(tick.price),
                None => tick.price,
            });
            if self.ticks_seen == self.params.window_ticks {
                tracing::info!(
                    "OpeningRange: range locked for {} at [{} .. {}]",
                    self.symbol,
                    self.range_low.unwrap_or_default(),
                    self.range_high.unwrap_or_default()
                );
            }
            return None;
        }

        let (Some(high), Some(low)) = (self.range_high, self.range_low) else {
            return None;
        };

        if !self.long_fired && tick.price > high {
            self.long_fired = true;
            tracing::info!(
                "OpeningRange: LTP {} broke above range high {}, signaling BUY",
                tick.price,
                high
            );
            return Some(OrderSide::Buy);
        }
        if !self.short_fired && tick.price < low {
            self.short_fired = true;
            tracing::info!(
                "OpeningRange: LTP {} broke below range low {}, signaling SELL",
                tick.price,
                low
            );
            return Some(OrderSide::Sell);
        }
        None
    }

    fn size_position(&self, _side: OrderSide, _limits: &RiskLimits) -> Decimal {
        self.params.order_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::TickSource;
    use rust_decimal_macros::dec;

    fn make_strategy(window: u32) -> OpeningRange {
        let params = OpeningRangeParams {
            window_ticks: window,
            order_quantity: dec!(10),
        };
        let mut strategy = OpeningRange::new(params, "NIFTY 50".to_string()).unwrap();
        strategy.start();
        strategy
    }

    fn make_tick(price: Decimal) -> MarketTick {
        MarketTick::new("NIFTY 50", price, TickSource::Simulated)
    }

    #[test]
    fn rejects_zero_window() {
        let params = OpeningRangeParams {
            window_ticks: 0,
            order_quantity: dec!(10),
        };
        let result = OpeningRange::new(params, "NIFTY 50".to_string());
        assert!(matches!(result, Err(StrategyError::InvalidParameters(_))));
    }

    #[test]
    fn window_ticks_build_the_range_without_signals() {
        let mut strategy = make_strategy(3);
        assert_eq!(strategy.generate_signal(&make_tick(dec!(100))), None);
        assert_eq!(strategy.generate_signal(&make_tick(dec!(102))), None);
        assert_eq!(strategy.generate_signal(&make_tick(dec!(99))), None);
        // Inside the locked range: still nothing.
        assert_eq!(strategy.generate_signal(&make_tick(dec!(101))), None);
    }

    #[test]
    fn breakout_above_range_fires_buy_once() {
        let mut strategy = make_strategy(3);
        for price in [dec!(100), dec!(102), dec!(99)] {
            strategy.generate_signal(&make_tick(price));
        }
        assert_eq!(
            strategy.generate_signal(&make_tick(dec!(103))),
            Some(OrderSide::Buy)
        );
        assert_eq!(strategy.generate_signal(&make_tick(dec!(104))), None);
    }

    #[test]
    fn breakdown_below_range_fires_sell_once() {
        let mut strategy = make_strategy(3);
        for price in [dec!(100), dec!(102), dec!(99)] {
            strategy.generate_signal(&make_tick(price));
        }
        assert_eq!(
            strategy.generate_signal(&make_tick(dec!(98))),
            Some(OrderSide::Sell)
        );
        assert_eq!(strategy.generate_signal(&make_tick(dec!(97))), None);
        // The long side is still armed after the short fired.
        assert_eq!(
            strategy.generate_signal(&make_tick(dec!(103))),
            Some(OrderSide::Buy)
        );
    }
}
