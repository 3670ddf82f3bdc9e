use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, NaiveDate, NaiveDateTime};
use configuration::RiskSettings;
use core_types::{EventSeverity, RiskLimits, SystemEvent};
use events::{EventBus, LogLevel};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use store::Store;
use tokio::sync::Mutex;

use crate::error::RiskRejection;

const COMPONENT: &str = "risk_gate";

/// Per-owner daily trading counters. All fields reset when `trading_day`
/// rolls over; mutation happens only through `RiskGate::record_outcome`.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCounters {
    pub trading_day: NaiveDate,
    pub trades_today: u32,
    pub consecutive_losses: u32,
    pub last_trade_time: Option<NaiveDateTime>,
    pub daily_realized_pnl: Decimal,
}

impl RiskCounters {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            trading_day: day,
            trades_today: 0,
            consecutive_losses: 0,
            last_trade_time: None,
            daily_realized_pnl: Decimal::ZERO,
        }
    }
}

/// The pre-trade risk gate.
///
/// Every order attempt passes through `check_trade_allowed` before it can
/// reach a broker, paper or real. The gate holds per-owner daily counters in
/// memory and refreshes its limit snapshot from the store before each check,
/// so an operator edit to the stored limits takes effect on the next trade
/// without a restart. A refresh failure falls back to the cached snapshot.
///
/// All clock comparisons use naive wall-clock time; the process is expected
/// to run in the exchange's session timezone.
pub struct RiskGate {
    store: Arc<dyn Store>,
    bus: EventBus,
    capital_base: Decimal,
    defaults: RiskLimits,
    limits: Mutex<HashMap<String, RiskLimits>>,
    counters: Mutex<HashMap<String, RiskCounters>>,
    kill_switch: AtomicBool,
}

impl RiskGate {
    pub fn new(store: Arc<dyn Store>, bus: EventBus, settings: &RiskSettings) -> Self {
        Self {
            store,
            bus,
            capital_base: settings.capital_base,
            defaults: settings.default_limits(),
            limits: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            kill_switch: AtomicBool::new(false),
        }
    }

    /// Runs the global pre-trade checks for an owner. `current_pnl_pct` is
    /// the owner's daily PnL as a percentage of the capital base, negative
    /// for a loss.
    pub async fn check_trade_allowed(
        &self,
        owner_id: &str,
        current_pnl_pct: Decimal,
    ) -> Result<(), RiskRejection> {
        self.check_trade_allowed_at(owner_id, current_pnl_pct, Local::now().naive_local())
            .await
    }

    pub async fn check_trade_allowed_at(
        &self,
        owner_id: &str,
        current_pnl_pct: Decimal,
        now: NaiveDateTime,
    ) -> Result<(), RiskRejection> {
        let limits = self.refreshed_limits(owner_id).await;

        // 1. Kill switch, local or persisted. Outranks everything.
        if self.kill_switch.load(Ordering::Relaxed) || limits.kill_switch {
            tracing::error!("Trade rejected for {owner_id}: kill switch active");
            return Err(RiskRejection::KillSwitch);
        }

        // 2. Session close guard.
        if now.time() >= limits.hard_stop_time {
            tracing::warn!(
                "Trade rejected for {owner_id}: market closing soon (current: {})",
                now.time()
            );
            return Err(RiskRejection::MarketClosing {
                now: now.time(),
                hard_stop: limits.hard_stop_time,
            });
        }

        let counters = self.counters_snapshot(owner_id, now.date()).await;

        // 3. Trade count ceiling.
        if counters.trades_today >= limits.max_trades_per_day {
            tracing::warn!(
                "Trade rejected for {owner_id}: max daily trades reached ({})",
                counters.trades_today
            );
            return Err(RiskRejection::MaxTradesReached {
                trades: counters.trades_today,
                max: limits.max_trades_per_day,
            });
        }

        // 4. Hard daily loss limit.
        if current_pnl_pct <= -limits.max_daily_loss_pct {
            tracing::error!(
                "Trade rejected for {owner_id}: max daily loss hit ({current_pnl_pct}%)"
            );
            return Err(RiskRejection::MaxDailyLoss {
                pnl_pct: current_pnl_pct,
                limit_pct: limits.max_daily_loss_pct,
            });
        }

        // 5. Soft stop. Warns the operator but never blocks.
        if current_pnl_pct <= -limits.soft_stop_loss_pct {
            let message = format!(
                "Soft stop hit for {owner_id}: daily PnL {current_pnl_pct}% past -{}%, trading continues",
                limits.soft_stop_loss_pct
            );
            tracing::warn!("{message}");
            self.bus.log(LogLevel::Warn, COMPONENT, message.as_str());
            let event = SystemEvent::new(COMPONENT, EventSeverity::Warning, message);
            if let Err(err) = self.store.record_system_event(&event).await {
                tracing::error!("Failed to persist soft-stop warning: {err}");
            }
        }

        // 6. Losing-streak guard.
        if counters.consecutive_losses >= limits.max_consecutive_losses {
            tracing::error!(
                "Trade blocked for {owner_id}: {} consecutive losses, resets tomorrow",
                counters.consecutive_losses
            );
            return Err(RiskRejection::ConsecutiveLossGuard {
                count: counters.consecutive_losses,
            });
        }

        // 7. Cooldown between trades.
        if let Some(last) = counters.last_trade_time {
            let elapsed = (now - last).num_seconds();
            if elapsed < limits.cooldown_seconds {
                let remaining_secs = limits.cooldown_seconds - elapsed;
                tracing::warn!(
                    "Trade rejected for {owner_id}: cooldown active ({remaining_secs}s remaining)"
                );
                return Err(RiskRejection::CooldownActive { remaining_secs });
            }
        }

        Ok(())
    }

    /// Records a completed trade. `pnl` is the realized profit or loss the
    /// fill produced, zero for a fill that only opened or added exposure.
    pub async fn record_outcome(&self, owner_id: &str, pnl: Decimal) {
        self.record_outcome_at(owner_id, pnl, Local::now().naive_local())
            .await
    }

    pub async fn record_outcome_at(&self, owner_id: &str, pnl: Decimal, now: NaiveDateTime) {
        let mut counters = self.counters.lock().await;
        let entry = counters
            .entry(owner_id.to_string())
            .or_insert_with(|| RiskCounters::fresh(now.date()));
        if entry.trading_day != now.date() {
            *entry = RiskCounters::fresh(now.date());
        }

        entry.trades_today += 1;
        entry.last_trade_time = Some(now);
        entry.daily_realized_pnl += pnl;
        if pnl < Decimal::ZERO {
            entry.consecutive_losses += 1;
            tracing::info!(
                "Risk update for {owner_id}: loss recorded, consecutive losses {}",
                entry.consecutive_losses
            );
        } else {
            entry.consecutive_losses = 0;
            tracing::info!("Risk update for {owner_id}: win recorded, loss streak reset");
        }
        tracing::info!(
            "Risk update for {owner_id}: total trades {}, last PnL {pnl}",
            entry.trades_today
        );
    }

    /// The owner's realized daily PnL as a percentage of the capital base.
    pub async fn daily_pnl_pct(&self, owner_id: &str) -> Decimal {
        self.daily_pnl_pct_at(owner_id, Local::now().naive_local())
            .await
    }

    pub async fn daily_pnl_pct_at(&self, owner_id: &str, now: NaiveDateTime) -> Decimal {
        let counters = self.counters_snapshot(owner_id, now.date()).await;
        if self.capital_base <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        counters.daily_realized_pnl / self.capital_base * dec!(100)
    }

    /// A copy of the owner's current counters, for status surfaces.
    pub async fn snapshot(&self, owner_id: &str) -> Option<RiskCounters> {
        self.counters.lock().await.get(owner_id).cloned()
    }

    /// The limits the gate would apply to the owner's next trade. Strategies
    /// size positions against this same snapshot.
    pub async fn limits_for(&self, owner_id: &str) -> RiskLimits {
        self.refreshed_limits(owner_id).await
    }

    pub fn engage_kill_switch(&self) {
        self.kill_switch.store(true, Ordering::Relaxed);
        tracing::error!("Kill switch ENGAGED: all new trades will be rejected");
        self.bus.log(LogLevel::Error, COMPONENT, "Kill switch engaged");
    }

    pub fn release_kill_switch(&self) {
        self.kill_switch.store(false, Ordering::Relaxed);
        tracing::warn!("Kill switch released: trading re-enabled");
        self.bus.log(LogLevel::Warn, COMPONENT, "Kill switch released");
    }

    pub fn kill_switch_engaged(&self) -> bool {
        self.kill_switch.load(Ordering::Relaxed)
    }

    /// Latest limits for the owner: store snapshot if reachable, else the
    /// last cached copy, else the configured defaults.
    async fn refreshed_limits(&self, owner_id: &str) -> RiskLimits {
        match self.store.risk_limits(owner_id).await {
            Ok(Some(fresh)) => {
                let mut cached = self.limits.lock().await;
                cached.insert(owner_id.to_string(), fresh.clone());
                fresh
            }
            Ok(None) => self.cached_limits(owner_id).await,
            Err(err) => {
                tracing::error!("Risk limit sync failed for {owner_id}, using cached: {err}");
                self.cached_limits(owner_id).await
            }
        }
    }

    async fn cached_limits(&self, owner_id: &str) -> RiskLimits {
        self.limits
            .lock()
            .await
            .get(owner_id)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    async fn counters_snapshot(&self, owner_id: &str, day: NaiveDate) -> RiskCounters {
        let mut counters = self.counters.lock().await;
        let entry = counters
            .entry(owner_id.to_string())
            .or_insert_with(|| RiskCounters::fresh(day));
        if entry.trading_day != day {
            *entry = RiskCounters::fresh(day);
        }
        entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use events::Diagnostic;
    use store::MemoryStore;

    fn make_settings() -> RiskSettings {
        RiskSettings {
            max_trades_per_day: 25,
            max_daily_loss_pct: dec!(2.0),
            soft_stop_loss_pct: dec!(1.0),
            max_consecutive_losses: 4,
            cooldown_seconds: 60,
            hard_stop_time: NaiveTime::from_hms_opt(15, 15, 0).unwrap(),
            capital_base: dec!(100000),
        }
    }

    fn make_gate(store: Arc<MemoryStore>) -> RiskGate {
        RiskGate::new(store, EventBus::new(16), &make_settings())
    }

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    #[tokio::test]
    async fn allows_a_clean_first_trade() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(10, 0, 0))
            .await;
        assert!(verdict.is_ok());
    }

    #[tokio::test]
    async fn kill_switch_outranks_every_other_check() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        for i in 0..25 {
            gate.record_outcome_at("owner-1", dec!(1), at(9, 30, i)).await;
        }
        gate.engage_kill_switch();

        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(10, 0, 0))
            .await;
        assert_eq!(verdict, Err(RiskRejection::KillSwitch));

        // With the switch released, the next rule in line fires instead.
        gate.release_kill_switch();
        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(10, 0, 0))
            .await;
        assert_eq!(
            verdict,
            Err(RiskRejection::MaxTradesReached { trades: 25, max: 25 })
        );
    }

    #[tokio::test]
    async fn hard_stop_time_blocks_late_trades() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        assert!(
            gate.check_trade_allowed_at("owner-1", dec!(0), at(15, 14, 59))
                .await
                .is_ok()
        );
        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(15, 15, 0))
            .await;
        assert!(matches!(verdict, Err(RiskRejection::MarketClosing { .. })));
    }

    #[tokio::test]
    async fn trade_count_at_limit_is_rejected() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        for i in 0..25 {
            gate.record_outcome_at("owner-1", dec!(1), at(9, 30, i)).await;
        }
        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(10, 0, 0))
            .await;
        assert_eq!(
            verdict,
            Err(RiskRejection::MaxTradesReached { trades: 25, max: 25 })
        );
    }

    #[tokio::test]
    async fn breaching_max_daily_loss_blocks() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(-2.0), at(10, 0, 0))
            .await;
        assert!(matches!(verdict, Err(RiskRejection::MaxDailyLoss { .. })));
    }

    #[tokio::test]
    async fn soft_stop_warns_but_allows_the_trade() {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(16);
        let mut diagnostics = bus.subscribe_diagnostics();
        let gate = RiskGate::new(store.clone(), bus, &make_settings());

        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(-1.5), at(10, 0, 0))
            .await;
        assert!(verdict.is_ok());

        let diagnostic = diagnostics.recv().await.unwrap();
        assert!(matches!(diagnostic, Diagnostic::SystemLog(_)));
        assert_eq!(store.system_event_count().await, 1);
    }

    #[tokio::test]
    async fn losing_streak_blocks_until_a_win() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        for i in 0..4 {
            gate.record_outcome_at("owner-1", dec!(-10), at(9, 30, i)).await;
        }
        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(10, 0, 0))
            .await;
        assert_eq!(verdict, Err(RiskRejection::ConsecutiveLossGuard { count: 4 }));

        gate.record_outcome_at("owner-1", dec!(5), at(10, 5, 0)).await;
        assert!(
            gate.check_trade_allowed_at("owner-1", dec!(0), at(10, 10, 0))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn cooldown_expires_after_the_configured_window() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        gate.record_outcome_at("owner-1", dec!(1), at(10, 0, 0)).await;

        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(10, 0, 30))
            .await;
        assert_eq!(
            verdict,
            Err(RiskRejection::CooldownActive { remaining_secs: 30 })
        );

        assert!(
            gate.check_trade_allowed_at("owner-1", dec!(0), at(10, 1, 0))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn day_rollover_resets_counters() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        for i in 0..4 {
            gate.record_outcome_at("owner-1", dec!(-10), at(9, 30, i)).await;
        }

        let next_day = NaiveDate::from_ymd_opt(2026, 3, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert!(
            gate.check_trade_allowed_at("owner-1", dec!(0), next_day)
                .await
                .is_ok()
        );
        let counters = gate.snapshot("owner-1").await.unwrap();
        assert_eq!(counters.trades_today, 0);
        assert_eq!(counters.daily_realized_pnl, dec!(0));
    }

    #[tokio::test]
    async fn owners_do_not_share_counters() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        for i in 0..4 {
            gate.record_outcome_at("owner-a", dec!(-10), at(9, 30, i)).await;
        }
        assert!(
            gate.check_trade_allowed_at("owner-b", dec!(0), at(10, 0, 0))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn stored_limits_override_configured_defaults() {
        let store = Arc::new(MemoryStore::new());
        let gate = make_gate(store.clone());

        let tightened = RiskLimits {
            max_trades_per_day: 1,
            ..RiskLimits::default()
        };
        store.put_risk_limits("owner-1", &tightened).await.unwrap();

        gate.record_outcome_at("owner-1", dec!(1), at(9, 30, 0)).await;
        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(10, 0, 0))
            .await;
        assert_eq!(
            verdict,
            Err(RiskRejection::MaxTradesReached { trades: 1, max: 1 })
        );
    }

    #[tokio::test]
    async fn persisted_kill_switch_blocks_without_local_engage() {
        let store = Arc::new(MemoryStore::new());
        let gate = make_gate(store.clone());

        let limits = RiskLimits {
            kill_switch: true,
            ..RiskLimits::default()
        };
        store.put_risk_limits("owner-1", &limits).await.unwrap();

        let verdict = gate
            .check_trade_allowed_at("owner-1", dec!(0), at(10, 0, 0))
            .await;
        assert_eq!(verdict, Err(RiskRejection::KillSwitch));
        assert!(!gate.kill_switch_engaged());
    }

    #[tokio::test]
    async fn limits_for_prefers_the_stored_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let gate = make_gate(store.clone());
        assert_eq!(gate.limits_for("owner-1").await.max_trades_per_day, 25);

        let tightened = RiskLimits {
            max_trades_per_day: 3,
            ..RiskLimits::default()
        };
        store.put_risk_limits("owner-1", &tightened).await.unwrap();
        assert_eq!(gate.limits_for("owner-1").await.max_trades_per_day, 3);
    }

    #[tokio::test]
    async fn daily_pnl_pct_is_realized_pnl_over_capital_base() {
        let gate = make_gate(Arc::new(MemoryStore::new()));
        gate.record_outcome_at("owner-1", dec!(-2000), at(10, 0, 0)).await;
        let pct = gate.daily_pnl_pct_at("owner-1", at(10, 1, 0)).await;
        assert_eq!(pct, dec!(-2));
    }
}
