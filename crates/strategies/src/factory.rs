use crate::Strategy;
use crate::error::StrategyError;
use crate::opening_range::OpeningRange;
use crate::vwap_momentum::VwapMomentum;
use configuration::Config;
use core_types::AlgoId;

/// Creates a new strategy instance based on the provided ID and configuration.
///
/// The match statement is exhaustive over `AlgoId`, so the compiler errors if
/// a new registry member is added but not handled here.
pub fn create_strategy(
    id: AlgoId,
    config: &Config,
    symbol: &str,
) -> Result<Box<dyn Strategy>, StrategyError> {
    match id {
        AlgoId::VwapMomentum => {
            let params = config.strategies.vwap_momentum.clone();
            Ok(Box::new(VwapMomentum::new(params, symbol.to_string())?))
        }
        AlgoId::OpeningRange => {
            let params = config.strategies.opening_range.clone();
            Ok(Box::new(OpeningRange::new(params, symbol.to_string())?))
        }
    }
}
