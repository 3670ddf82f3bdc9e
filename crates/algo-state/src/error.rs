use chrono::NaiveTime;
use core_types::{AlgoId, TradeMode};
use store::StoreError;
use strategies::StrategyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlgoStateError {
    #[error("Unknown algo: '{0}'")]
    UnknownStrategy(String),

    /// Carries the selection that already holds the day, so callers can
    /// report exactly what blocked them.
    #[error("Algo already locked to {algo} ({mode}) for today")]
    AlreadyLocked { algo: AlgoId, mode: TradeMode },

    #[error("Cannot select a new algo after {cutoff}")]
    LockWindowClosed { cutoff: NaiveTime },

    #[error("Strategy construction failed: {0}")]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
