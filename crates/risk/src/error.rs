use chrono::NaiveTime;
use rust_decimal::Decimal;
use thiserror::Error;

/// Why the risk gate refused a trade.
///
/// Checks run in a fixed order and the first failure is returned, so a
/// rejection names the highest-priority rule that tripped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskRejection {
    #[error("Kill switch is active")]
    KillSwitch,

    #[error("Market closing soon (now {now}, hard stop {hard_stop})")]
    MarketClosing { now: NaiveTime, hard_stop: NaiveTime },

    #[error("Max daily trades reached ({trades} of {max})")]
    MaxTradesReached { trades: u32, max: u32 },

    #[error("Max daily loss hit ({pnl_pct}% breaches -{limit_pct}%)")]
    MaxDailyLoss { pnl_pct: Decimal, limit_pct: Decimal },

    #[error("{count} consecutive losses, trading blocked until tomorrow")]
    ConsecutiveLossGuard { count: u32 },

    #[error("Cooldown active ({remaining_secs}s remaining)")]
    CooldownActive { remaining_secs: i64 },
}
