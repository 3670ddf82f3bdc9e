use std::collections::HashMap;

use chrono::NaiveTime;
use core_types::RiskLimits;
use rust_decimal::Decimal;
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineSettings,
    pub market_data: MarketDataSettings,
    pub broker: BrokerSettings,
    pub risk: RiskSettings,
    pub paper: PaperSettings,
    pub store: StoreSettings,
    pub strategies: Strategies,
}

/// Parameters for the engine loop and its background sweeps.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// The owner this engine process trades for.
    pub owner_id: String,
    /// The instrument the active strategy is driven with.
    pub symbol: String,
    /// Whether strategy locks are refused after `lock_cutoff`.
    pub lock_cutoff_enabled: bool,
    /// Time of day after which no new algo may be locked in.
    pub lock_cutoff: NaiveTime,
    /// How often pending paper orders are swept against the current price.
    pub paper_sweep_interval_secs: u64,
    /// How often live orders are reconciled against the broker's book.
    pub live_sync_interval_secs: u64,
    /// Heartbeat cadence for the health task.
    pub heartbeat_interval_secs: u64,
}

/// Parameters for the market data router and its feed adapters.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataSettings {
    /// How often the routing rule is re-evaluated.
    pub route_refresh_secs: u64,
    /// Fixed delay between broker feed reconnect attempts.
    pub reconnect_delay_secs: u64,
    pub sim: SimFeedSettings,
}

/// Parameters for the simulated random-walk feed.
#[derive(Debug, Clone, Deserialize)]
pub struct SimFeedSettings {
    /// Cadence of synthetic ticks, per symbol.
    pub tick_interval_ms: u64,
    /// Largest single-tick move, as a percentage of the current price.
    pub max_step_pct: Decimal,
    /// Starting price per symbol.
    pub seed_prices: HashMap<String, Decimal>,
}

/// Connection details for the broker. The wire protocol behind these
/// endpoints is the broker client's concern.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    pub base_url: String,
    /// WebSocket endpoint for the quote stream.
    pub feed_url: String,
    /// Session token. Usually left unset here and supplied via the
    /// environment at startup.
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
}

/// Default risk limits. Per-owner snapshots in the store override these.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskSettings {
    pub max_trades_per_day: u32,
    pub max_daily_loss_pct: Decimal,
    pub soft_stop_loss_pct: Decimal,
    pub max_consecutive_losses: u32,
    pub cooldown_seconds: i64,
    pub hard_stop_time: NaiveTime,
    /// The capital base daily PnL percentages are computed against.
    pub capital_base: Decimal,
}

impl RiskSettings {
    /// The limits snapshot used until the store provides one.
    pub fn default_limits(&self) -> RiskLimits {
        RiskLimits {
            max_trades_per_day: self.max_trades_per_day,
            max_daily_loss_pct: self.max_daily_loss_pct,
            soft_stop_loss_pct: self.soft_stop_loss_pct,
            max_consecutive_losses: self.max_consecutive_losses,
            cooldown_seconds: self.cooldown_seconds,
            hard_stop_time: self.hard_stop_time,
            kill_switch: false,
        }
    }
}

/// Parameters for the virtual paper broker.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperSettings {
    /// Balance a paper wallet is provisioned with on first use.
    pub starting_balance: Decimal,
}

/// Which persistence backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Postgres connection string. Usually supplied via DATABASE_URL.
    pub database_url: Option<String>,
}

/// Contains the parameter sets for all available strategies.
#[derive(Debug, Deserialize, Clone)]
pub struct Strategies {
    pub vwap_momentum: VwapMomentumParams,
    pub opening_range: OpeningRangeParams,
}

/// Parameters for the session-VWAP momentum strategy.
#[derive(Debug, Deserialize, Clone)]
pub struct VwapMomentumParams {
    /// How far above VWAP the price must break, as a percentage, before a
    /// long signal fires.
    pub buffer_pct: Decimal,
    /// Ticks accumulated before the VWAP is considered meaningful.
    pub min_warmup_ticks: u32,
    /// Fixed quantity per order.
    pub order_quantity: Decimal,
}

/// Parameters for the opening-range breakout strategy.
#[derive(Debug, Deserialize, Clone)]
pub struct OpeningRangeParams {
    /// Ticks that make up the opening range before breakouts are tracked.
    pub window_ticks: u32,
    /// Fixed quantity per order.
    pub order_quantity: Decimal,
}
