use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use configuration::Config;
use core_types::{AlgoDayState, AlgoId, AlgoRunStatus, TradeMode};
use events::{AlgoStatusUpdate, EventBus, LogLevel};
use store::{Store, StoreError};
use strategies::{Strategy, create_strategy};
use tokio::sync::Mutex;

use crate::error::AlgoStateError;

const COMPONENT: &str = "algo_state";

/// A strategy instance shared between the state machine and the tick runner.
pub type StrategyHandle = Arc<Mutex<Box<dyn Strategy>>>;

struct OwnerDay {
    state: AlgoDayState,
    strategy: StrategyHandle,
}

/// Manages the daily lifecycle of the trading algorithm.
///
/// Rules enforced here:
/// 1. One algo selection per owner per trading day. The store's uniqueness
///    constraint backs this up across processes.
/// 2. Relocking the identical selection is an idempotent success; any other
///    selection is refused until tomorrow.
/// 3. Optionally, new locks are refused after a configured time of day.
///
/// Cached state belongs to a single trading day; queries for a different day
/// discard it, so a process left running overnight starts the next day
/// unlocked.
pub struct AlgoStateMachine {
    store: Arc<dyn Store>,
    bus: EventBus,
    config: Config,
    lock_cutoff_enabled: bool,
    lock_cutoff: NaiveTime,
    inner: Mutex<HashMap<String, OwnerDay>>,
}

impl AlgoStateMachine {
    pub fn new(store: Arc<dyn Store>, bus: EventBus, config: Config) -> Self {
        let lock_cutoff_enabled = config.engine.lock_cutoff_enabled;
        let lock_cutoff = config.engine.lock_cutoff;
        Self {
            store,
            bus,
            config,
            lock_cutoff_enabled,
            lock_cutoff,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to lock `algo_name` for the owner's trading day.
    pub async fn lock(
        &self,
        owner_id: &str,
        algo_name: &str,
        mode: TradeMode,
    ) -> Result<AlgoDayState, AlgoStateError> {
        self.lock_at(owner_id, algo_name, mode, Local::now().naive_local())
            .await
    }

    pub async fn lock_at(
        &self,
        owner_id: &str,
        algo_name: &str,
        mode: TradeMode,
        now: NaiveDateTime,
    ) -> Result<AlgoDayState, AlgoStateError> {
        let algo: AlgoId = algo_name
            .parse()
            .map_err(|_| AlgoStateError::UnknownStrategy(algo_name.to_string()))?;
        let today = now.date();

        // Live cache first.
        {
            let mut cache = self.inner.lock().await;
            match cache.get(owner_id) {
                Some(day) if day.state.trade_date == today => {
                    let state = day.state.clone();
                    if state.algo == algo && state.mode == mode {
                        tracing::info!(
                            "Algo already locked to {algo} ({mode}) for {owner_id}, no-op"
                        );
                        return Ok(state);
                    }
                    tracing::warn!(
                        "BLOCKED: {owner_id} already locked to {} ({})",
                        state.algo,
                        state.mode
                    );
                    return Err(AlgoStateError::AlreadyLocked {
                        algo: state.algo,
                        mode: state.mode,
                    });
                }
                Some(_) => {
                    // Previous trading day; discard.
                    cache.remove(owner_id);
                }
                None => {}
            }
        }

        // The store may know about today even when the cache does not, e.g.
        // after a restart.
        if let Some(existing) = self.store.algo_day(owner_id, today).await? {
            if existing.algo == algo && existing.mode == mode {
                return self.materialize(owner_id, existing).await;
            }
            tracing::warn!(
                "BLOCKED: {owner_id} already locked to {} ({})",
                existing.algo,
                existing.mode
            );
            return Err(AlgoStateError::AlreadyLocked {
                algo: existing.algo,
                mode: existing.mode,
            });
        }

        // Cutoff applies to new locks only; relocks above never reach here.
        if self.lock_cutoff_enabled && now.time() > self.lock_cutoff {
            tracing::warn!(
                "BLOCKED: {owner_id} cannot select a new algo after {}",
                self.lock_cutoff
            );
            return Err(AlgoStateError::LockWindowClosed {
                cutoff: self.lock_cutoff,
            });
        }

        let state = AlgoDayState {
            owner_id: owner_id.to_string(),
            trade_date: today,
            algo,
            mode,
            status: AlgoRunStatus::Running,
            locked_at: Utc::now(),
        };

        match self.store.insert_algo_day(&state).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                // Lost the race to another writer; surface whatever won.
                let winner = self.store.algo_day(owner_id, today).await?;
                return match winner {
                    Some(w) if w.algo == algo && w.mode == mode => {
                        self.materialize(owner_id, w).await
                    }
                    Some(w) => Err(AlgoStateError::AlreadyLocked {
                        algo: w.algo,
                        mode: w.mode,
                    }),
                    None => Err(AlgoStateError::Store(StoreError::Corrupt(
                        "algo day reported duplicate but no record found".to_string(),
                    ))),
                };
            }
            Err(err) => return Err(err.into()),
        }

        let state = self.materialize(owner_id, state).await?;
        tracing::info!("ALGO LOCKED: {algo} [{mode}] for {owner_id}");
        self.bus
            .log(LogLevel::Info, COMPONENT, format!("Algo locked: {algo} [{mode}]"));
        self.publish_status(&state);
        Ok(state)
    }

    /// Loads today's persisted selection at startup so a restart resumes the
    /// locked day. Returns the resumed state, if any.
    pub async fn initialize(&self, owner_id: &str) -> Result<Option<AlgoDayState>, AlgoStateError> {
        self.initialize_on(owner_id, Local::now().date_naive()).await
    }

    pub async fn initialize_on(
        &self,
        owner_id: &str,
        day: NaiveDate,
    ) -> Result<Option<AlgoDayState>, AlgoStateError> {
        match self.store.algo_day(owner_id, day).await? {
            Some(state) => {
                tracing::info!(
                    "Loaded daily algo state for {owner_id}: {} ({}) {:?}",
                    state.algo,
                    state.mode,
                    state.status
                );
                let state = self.materialize(owner_id, state).await?;
                Ok(Some(state))
            }
            None => {
                tracing::info!("No algo state found for {owner_id} today, waiting for selection");
                Ok(None)
            }
        }
    }

    /// Flips the day's status to Stopped, disarms the strategy, persists.
    /// A no-op when nothing is locked.
    pub async fn stop(&self, owner_id: &str) -> Result<(), AlgoStateError> {
        self.stop_on(owner_id, Local::now().date_naive()).await
    }

    pub async fn stop_on(&self, owner_id: &str, day: NaiveDate) -> Result<(), AlgoStateError> {
        let entry = {
            let mut cache = self.inner.lock().await;
            match cache.get(owner_id) {
                Some(owner_day) if owner_day.state.trade_date == day => {
                    Some(owner_day.strategy.clone())
                }
                Some(_) => {
                    cache.remove(owner_id);
                    None
                }
                None => None,
            }
        };

        match self.store.set_algo_status(owner_id, day, AlgoRunStatus::Stopped).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        if let Some(strategy) = entry {
            strategy.lock().await.stop();
            let mut cache = self.inner.lock().await;
            if let Some(owner_day) = cache.get_mut(owner_id) {
                owner_day.state.status = AlgoRunStatus::Stopped;
                self.publish_status(&owner_day.state);
            }
        }
        tracing::info!("Algo stopped for {owner_id}");
        Ok(())
    }

    pub async fn is_running(&self, owner_id: &str) -> bool {
        self.is_running_on(owner_id, Local::now().date_naive()).await
    }

    pub async fn is_running_on(&self, owner_id: &str, day: NaiveDate) -> bool {
        let cache = self.inner.lock().await;
        cache
            .get(owner_id)
            .map(|d| d.state.trade_date == day && d.state.status == AlgoRunStatus::Running)
            .unwrap_or(false)
    }

    /// The owner's locked selection for the day, regardless of run status.
    pub async fn selected(&self, owner_id: &str) -> Option<(AlgoId, TradeMode)> {
        self.selected_on(owner_id, Local::now().date_naive()).await
    }

    pub async fn selected_on(&self, owner_id: &str, day: NaiveDate) -> Option<(AlgoId, TradeMode)> {
        let cache = self.inner.lock().await;
        cache
            .get(owner_id)
            .filter(|d| d.state.trade_date == day)
            .map(|d| (d.state.algo, d.state.mode))
    }

    /// The full algo-day record, the routing context for order placement.
    pub async fn context(&self, owner_id: &str) -> Option<AlgoDayState> {
        self.context_on(owner_id, Local::now().date_naive()).await
    }

    pub async fn context_on(&self, owner_id: &str, day: NaiveDate) -> Option<AlgoDayState> {
        let cache = self.inner.lock().await;
        cache
            .get(owner_id)
            .filter(|d| d.state.trade_date == day)
            .map(|d| d.state.clone())
    }

    /// The live strategy instance, shared with the tick runner.
    pub async fn strategy(&self, owner_id: &str) -> Option<StrategyHandle> {
        self.strategy_on(owner_id, Local::now().date_naive()).await
    }

    pub async fn strategy_on(&self, owner_id: &str, day: NaiveDate) -> Option<StrategyHandle> {
        let cache = self.inner.lock().await;
        cache
            .get(owner_id)
            .filter(|d| d.state.trade_date == day)
            .map(|d| d.strategy.clone())
    }

    /// Builds the live strategy for a state and installs it in the cache.
    async fn materialize(
        &self,
        owner_id: &str,
        state: AlgoDayState,
    ) -> Result<AlgoDayState, AlgoStateError> {
        let mut strategy = create_strategy(state.algo, &self.config, &self.config.engine.symbol)?;
        if state.status == AlgoRunStatus::Running {
            strategy.start();
        }
        let mut cache = self.inner.lock().await;
        cache.insert(
            owner_id.to_string(),
            OwnerDay {
                state: state.clone(),
                strategy: Arc::new(Mutex::new(strategy)),
            },
        );
        Ok(state)
    }

    fn publish_status(&self, state: &AlgoDayState) {
        self.bus.publish_algo_status(AlgoStatusUpdate {
            timestamp: Utc::now(),
            owner_id: state.owner_id.clone(),
            algo: state.algo,
            mode: state.mode,
            status: state.status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::load_config_from;
    use store::MemoryStore;

    fn workspace_config() -> Config {
        load_config_from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../config.toml")).unwrap()
    }

    fn make_machine(store: Arc<MemoryStore>, config: Config) -> AlgoStateMachine {
        AlgoStateMachine::new(store, EventBus::new(16), config)
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn first_lock_creates_and_starts_the_day() {
        let store = Arc::new(MemoryStore::new());
        let machine = make_machine(store.clone(), workspace_config());

        let state = machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 0))
            .await
            .unwrap();

        assert_eq!(state.algo, AlgoId::VwapMomentum);
        assert_eq!(state.status, AlgoRunStatus::Running);
        assert!(machine.is_running_on("owner-1", at(9, 0).date()).await);
        assert_eq!(
            machine.selected_on("owner-1", at(9, 0).date()).await,
            Some((AlgoId::VwapMomentum, TradeMode::Paper))
        );
        // Persisted through the store as well.
        let stored = store.algo_day("owner-1", at(9, 0).date()).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn relocking_the_same_selection_is_idempotent() {
        let machine = make_machine(Arc::new(MemoryStore::new()), workspace_config());

        let first = machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 0))
            .await
            .unwrap();
        let second = machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 5))
            .await
            .unwrap();

        assert_eq!(first.locked_at, second.locked_at);
    }

    #[tokio::test]
    async fn different_selection_is_rejected_with_the_conflict() {
        let machine = make_machine(Arc::new(MemoryStore::new()), workspace_config());

        machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 0))
            .await
            .unwrap();
        let verdict = machine
            .lock_at("owner-1", "opening_range", TradeMode::Paper, at(9, 5))
            .await;

        match verdict {
            Err(AlgoStateError::AlreadyLocked { algo, mode }) => {
                assert_eq!(algo, AlgoId::VwapMomentum);
                assert_eq!(mode, TradeMode::Paper);
            }
            other => panic!("expected AlreadyLocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_algo_different_mode_is_a_conflict() {
        let machine = make_machine(Arc::new(MemoryStore::new()), workspace_config());

        machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 0))
            .await
            .unwrap();
        let verdict = machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Live, at(9, 5))
            .await;
        assert!(matches!(verdict, Err(AlgoStateError::AlreadyLocked { .. })));
    }

    #[tokio::test]
    async fn unknown_name_is_rejected() {
        let machine = make_machine(Arc::new(MemoryStore::new()), workspace_config());
        let verdict = machine
            .lock_at("owner-1", "quantum_scalper", TradeMode::Paper, at(9, 0))
            .await;
        match verdict {
            Err(AlgoStateError::UnknownStrategy(name)) => assert_eq!(name, "quantum_scalper"),
            other => panic!("expected UnknownStrategy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cutoff_blocks_new_locks_when_enabled() {
        let mut config = workspace_config();
        config.engine.lock_cutoff_enabled = true;
        let machine = make_machine(Arc::new(MemoryStore::new()), config);

        let verdict = machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 30))
            .await;
        assert!(matches!(
            verdict,
            Err(AlgoStateError::LockWindowClosed { .. })
        ));

        assert!(
            machine
                .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 10))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn cutoff_never_blocks_relocks() {
        let mut config = workspace_config();
        config.engine.lock_cutoff_enabled = true;
        let machine = make_machine(Arc::new(MemoryStore::new()), config);

        machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 0))
            .await
            .unwrap();
        assert!(
            machine
                .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(11, 0))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn disabled_cutoff_is_bypassed() {
        let machine = make_machine(Arc::new(MemoryStore::new()), workspace_config());
        assert!(
            machine
                .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(14, 0))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn initialize_resumes_a_locked_day() {
        let store = Arc::new(MemoryStore::new());
        let day = at(9, 0).date();
        let state = AlgoDayState {
            owner_id: "owner-1".to_string(),
            trade_date: day,
            algo: AlgoId::OpeningRange,
            mode: TradeMode::Paper,
            status: AlgoRunStatus::Running,
            locked_at: Utc::now(),
        };
        store.insert_algo_day(&state).await.unwrap();

        let machine = make_machine(store, workspace_config());
        let resumed = machine.initialize_on("owner-1", day).await.unwrap();

        assert_eq!(resumed.map(|s| s.algo), Some(AlgoId::OpeningRange));
        assert!(machine.is_running_on("owner-1", day).await);
        assert!(machine.strategy_on("owner-1", day).await.is_some());
    }

    #[tokio::test]
    async fn initialize_without_a_record_waits_for_selection() {
        let machine = make_machine(Arc::new(MemoryStore::new()), workspace_config());
        let resumed = machine.initialize_on("owner-1", at(9, 0).date()).await.unwrap();
        assert!(resumed.is_none());
        assert!(!machine.is_running_on("owner-1", at(9, 0).date()).await);
    }

    #[tokio::test]
    async fn stop_flips_status_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let machine = make_machine(store.clone(), workspace_config());
        let day = at(9, 0).date();

        machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 0))
            .await
            .unwrap();
        machine.stop_on("owner-1", day).await.unwrap();

        assert!(!machine.is_running_on("owner-1", day).await);
        // The selection itself survives the stop.
        assert_eq!(
            machine.selected_on("owner-1", day).await,
            Some((AlgoId::VwapMomentum, TradeMode::Paper))
        );
        let stored = store.algo_day("owner-1", day).await.unwrap().unwrap();
        assert_eq!(stored.status, AlgoRunStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_without_a_lock_is_a_no_op() {
        let machine = make_machine(Arc::new(MemoryStore::new()), workspace_config());
        assert!(machine.stop_on("owner-1", at(9, 0).date()).await.is_ok());
    }

    #[tokio::test]
    async fn day_rollover_discards_stale_state() {
        let machine = make_machine(Arc::new(MemoryStore::new()), workspace_config());

        machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 0))
            .await
            .unwrap();

        let next_day = NaiveDate::from_ymd_opt(2026, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert!(!machine.is_running_on("owner-1", next_day.date()).await);
        // A fresh day accepts a fresh, different selection.
        let state = machine
            .lock_at("owner-1", "opening_range", TradeMode::Paper, next_day)
            .await
            .unwrap();
        assert_eq!(state.algo, AlgoId::OpeningRange);
    }

    #[tokio::test]
    async fn store_record_from_elsewhere_blocks_a_conflicting_lock() {
        let store = Arc::new(MemoryStore::new());
        let day = at(9, 0).date();
        let state = AlgoDayState {
            owner_id: "owner-1".to_string(),
            trade_date: day,
            algo: AlgoId::OpeningRange,
            mode: TradeMode::Live,
            status: AlgoRunStatus::Running,
            locked_at: Utc::now(),
        };
        store.insert_algo_day(&state).await.unwrap();

        let machine = make_machine(store, workspace_config());
        let verdict = machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 5))
            .await;
        match verdict {
            Err(AlgoStateError::AlreadyLocked { algo, mode }) => {
                assert_eq!(algo, AlgoId::OpeningRange);
                assert_eq!(mode, TradeMode::Live);
            }
            other => panic!("expected AlreadyLocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn relocking_a_stored_day_rehydrates_the_strategy() {
        let store = Arc::new(MemoryStore::new());
        let day = at(9, 0).date();
        let state = AlgoDayState {
            owner_id: "owner-1".to_string(),
            trade_date: day,
            algo: AlgoId::VwapMomentum,
            mode: TradeMode::Paper,
            status: AlgoRunStatus::Running,
            locked_at: Utc::now(),
        };
        store.insert_algo_day(&state).await.unwrap();

        let machine = make_machine(store, workspace_config());
        assert!(machine.strategy_on("owner-1", day).await.is_none());

        machine
            .lock_at("owner-1", "vwap_momentum", TradeMode::Paper, at(9, 5))
            .await
            .unwrap();
        assert!(machine.strategy_on("owner-1", day).await.is_some());
    }
}
