use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::{
    AlgoDayState, AlgoRunStatus, Execution, Order, OrderStatus, Position, PositionStatus,
    RiskLimits, SystemEvent, Wallet,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::interface::{FillRecord, Store};

#[derive(Default)]
struct MemoryInner {
    algo_days: HashMap<(String, NaiveDate), AlgoDayState>,
    risk_limits: HashMap<String, RiskLimits>,
    orders: HashMap<Uuid, Order>,
    executions: Vec<Execution>,
    /// Open positions, keyed by (owner, symbol). Closed rows move to
    /// `position_history`.
    open_positions: HashMap<(String, String), Position>,
    position_history: Vec<Position>,
    wallets: HashMap<String, Wallet>,
    system_events: Vec<SystemEvent>,
}

impl MemoryInner {
    fn apply_position(&mut self, position: &Position) {
        let key = (position.owner_id.clone(), position.symbol.clone());
        if position.status == PositionStatus::Closed {
            self.open_positions.remove(&key);
            self.position_history.push(position.clone());
        } else {
            self.open_positions.insert(key, position.clone());
        }
    }
}

/// The in-process store: default for paper trading and the double every
/// test wires in. All state lives behind one mutex, which is also what
/// makes `record_fill` atomic here.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of system events recorded so far. Handy for assertions.
    pub async fn system_event_count(&self) -> usize {
        self.inner.lock().await.system_events.len()
    }

    pub async fn last_system_event(&self) -> Option<SystemEvent> {
        self.inner.lock().await.system_events.last().cloned()
    }

    /// Number of executions recorded against one order. Handy for asserting
    /// that reconciliation never double-books a fill.
    pub async fn execution_count_for_order(&self, order_id: Uuid) -> usize {
        self.inner
            .lock()
            .await
            .executions
            .iter()
            .filter(|e| e.order_id == order_id)
            .count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn algo_day(
        &self,
        owner_id: &str,
        trade_date: NaiveDate,
    ) -> Result<Option<AlgoDayState>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .algo_days
            .get(&(owner_id.to_string(), trade_date))
            .cloned())
    }

    async fn insert_algo_day(&self, state: &AlgoDayState) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let key = (state.owner_id.clone(), state.trade_date);
        if inner.algo_days.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "algo day state for {} on {}",
                state.owner_id, state.trade_date
            )));
        }
        inner.algo_days.insert(key, state.clone());
        Ok(())
    }

    async fn set_algo_status(
        &self,
        owner_id: &str,
        trade_date: NaiveDate,
        status: AlgoRunStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.algo_days.get_mut(&(owner_id.to_string(), trade_date)) {
            Some(state) => {
                state.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "algo day state for {owner_id} on {trade_date}"
            ))),
        }
    }

    async fn risk_limits(&self, owner_id: &str) -> Result<Option<RiskLimits>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.risk_limits.get(owner_id).cloned())
    }

    async fn put_risk_limits(
        &self,
        owner_id: &str,
        limits: &RiskLimits,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.risk_limits.insert(owner_id.to_string(), limits.clone());
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.orders.contains_key(&order.order_id) {
            return Err(StoreError::Duplicate(format!("order {}", order.order_id)));
        }
        inner.orders.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&order_id).cloned())
    }

    async fn order_by_broker_id(
        &self,
        owner_id: &str,
        broker_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .values()
            .find(|o| {
                o.owner_id == owner_id && o.broker_order_id.as_deref() == Some(broker_order_id)
            })
            .cloned())
    }

    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        // Oldest first, so sweeps process orders in arrival order.
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&order.order_id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("order {}", order.order_id))),
        }
    }

    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.executions.push(execution.clone());
        Ok(())
    }

    async fn has_execution_for_order(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.executions.iter().any(|e| e.order_id == order_id))
    }

    async fn open_position(
        &self,
        owner_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .open_positions
            .get(&(owner_id.to_string(), symbol.to_string()))
            .cloned())
    }

    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.apply_position(position);
        Ok(())
    }

    async fn wallet(&self, owner_id: &str) -> Result<Option<Wallet>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.wallets.get(owner_id).cloned())
    }

    async fn put_wallet(&self, wallet: &Wallet) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.wallets.insert(wallet.owner_id.clone(), wallet.clone());
        Ok(())
    }

    async fn record_fill(&self, fill: &FillRecord) -> Result<(), StoreError> {
        // One lock for all four writes keeps the fill all-or-nothing.
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&fill.order.order_id) {
            Some(existing) => *existing = fill.order.clone(),
            None => {
                return Err(StoreError::NotFound(format!(
                    "order {}",
                    fill.order.order_id
                )));
            }
        }
        inner.executions.push(fill.execution.clone());
        inner.apply_position(&fill.position);
        inner
            .wallets
            .insert(fill.wallet.owner_id.clone(), fill.wallet.clone());
        Ok(())
    }

    async fn record_system_event(&self, event: &SystemEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.system_events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{AlgoId, OrderRequest, OrderSide, TradeMode};
    use rust_decimal_macros::dec;

    fn make_day_state(owner: &str) -> AlgoDayState {
        AlgoDayState {
            owner_id: owner.to_string(),
            trade_date: Utc::now().date_naive(),
            algo: AlgoId::VwapMomentum,
            mode: TradeMode::Paper,
            status: AlgoRunStatus::Running,
            locked_at: Utc::now(),
        }
    }

    fn make_filled_order(owner: &str) -> Order {
        let req = OrderRequest::market(owner, "NIFTY 50", OrderSide::Buy, dec!(10));
        let mut order = Order::pending(&req, TradeMode::Paper);
        order.status = OrderStatus::Filled;
        order.average_price = Some(dec!(100));
        order.filled_quantity = dec!(10);
        order
    }

    #[tokio::test]
    async fn algo_day_is_unique_per_owner_and_day() {
        let store = MemoryStore::new();
        let state = make_day_state("owner-1");

        store.insert_algo_day(&state).await.unwrap();
        let dup = store.insert_algo_day(&state).await;
        assert!(matches!(dup, Err(StoreError::Duplicate(_))));

        // A different owner on the same day is fine.
        store.insert_algo_day(&make_day_state("owner-2")).await.unwrap();
    }

    #[tokio::test]
    async fn set_algo_status_requires_existing_record() {
        let store = MemoryStore::new();
        let missing = store
            .set_algo_status("nobody", Utc::now().date_naive(), AlgoRunStatus::Stopped)
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn record_fill_commits_every_row() {
        let store = MemoryStore::new();
        let order = make_filled_order("owner-1");
        let mut pending = order.clone();
        pending.status = OrderStatus::Pending;
        pending.average_price = None;
        pending.filled_quantity = dec!(0);
        store.insert_order(&pending).await.unwrap();

        let execution = Execution::for_order(&order, dec!(10), dec!(100));
        let position = Position {
            position_id: Uuid::new_v4(),
            owner_id: order.owner_id.clone(),
            symbol: order.symbol.clone(),
            quantity: dec!(10),
            average_price: dec!(100),
            status: PositionStatus::Open,
            updated_at: Utc::now(),
        };
        let mut wallet = Wallet::with_balance(&order.owner_id, dec!(100000));
        wallet.available_balance = dec!(99000);
        wallet.used_margin = dec!(1000);

        store
            .record_fill(&FillRecord {
                order: order.clone(),
                execution,
                position,
                wallet,
            })
            .await
            .unwrap();

        let stored = store.order(order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert!(store.has_execution_for_order(order.order_id).await.unwrap());
        let pos = store
            .open_position("owner-1", "NIFTY 50")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pos.quantity, dec!(10));
        let wal = store.wallet("owner-1").await.unwrap().unwrap();
        assert_eq!(wal.used_margin, dec!(1000));
    }

    #[tokio::test]
    async fn record_fill_without_order_changes_nothing() {
        let store = MemoryStore::new();
        let order = make_filled_order("owner-1");
        let execution = Execution::for_order(&order, dec!(10), dec!(100));
        let position = Position {
            position_id: Uuid::new_v4(),
            owner_id: order.owner_id.clone(),
            symbol: order.symbol.clone(),
            quantity: dec!(10),
            average_price: dec!(100),
            status: PositionStatus::Open,
            updated_at: Utc::now(),
        };
        let wallet = Wallet::with_balance(&order.owner_id, dec!(100000));

        let result = store
            .record_fill(&FillRecord {
                order: order.clone(),
                execution,
                position,
                wallet,
            })
            .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(!store.has_execution_for_order(order.order_id).await.unwrap());
        assert!(store.wallet("owner-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_position_leaves_the_open_index() {
        let store = MemoryStore::new();
        let mut position = Position {
            position_id: Uuid::new_v4(),
            owner_id: "owner-1".to_string(),
            symbol: "NIFTY 50".to_string(),
            quantity: dec!(10),
            average_price: dec!(100),
            status: PositionStatus::Open,
            updated_at: Utc::now(),
        };
        store.upsert_position(&position).await.unwrap();
        assert!(store.open_position("owner-1", "NIFTY 50").await.unwrap().is_some());

        position.quantity = dec!(0);
        position.status = PositionStatus::Closed;
        store.upsert_position(&position).await.unwrap();
        assert!(store.open_position("owner-1", "NIFTY 50").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finds_orders_by_broker_id_and_status() {
        let store = MemoryStore::new();
        let req = OrderRequest::market("owner-1", "NIFTY 50", OrderSide::Buy, dec!(5));
        let mut order = Order::pending(&req, TradeMode::Live);
        order.broker_order_id = Some("BRK-123".to_string());
        store.insert_order(&order).await.unwrap();

        let found = store
            .order_by_broker_id("owner-1", "BRK-123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.order_id, order.order_id);

        assert!(store
            .order_by_broker_id("owner-2", "BRK-123")
            .await
            .unwrap()
            .is_none());

        let pending = store.orders_with_status(OrderStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(store
            .orders_with_status(OrderStatus::Filled)
            .await
            .unwrap()
            .is_empty());
    }
}
