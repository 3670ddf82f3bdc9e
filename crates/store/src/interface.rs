use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::{
    AlgoDayState, AlgoRunStatus, Execution, Order, OrderStatus, Position, RiskLimits,
    SystemEvent, Wallet,
};
use uuid::Uuid;

use crate::error::StoreError;

/// Everything a fill changes, committed as one unit.
///
/// The order is the post-fill row (status, average price, filled quantity
/// already updated); position and wallet are the post-fill states computed
/// by the ledger.
#[derive(Debug, Clone)]
pub struct FillRecord {
    pub order: Order,
    pub execution: Execution,
    pub position: Position,
    pub wallet: Wallet,
}

/// The persistence seam for the whole engine.
///
/// Queries are deliberately simple and keyed; anything smarter lives in the
/// callers. Implementations must make `record_fill` atomic: either every
/// row in the `FillRecord` lands or none do.
#[async_trait]
pub trait Store: Send + Sync {
    // --- algo day state ---

    async fn algo_day(
        &self,
        owner_id: &str,
        trade_date: NaiveDate,
    ) -> Result<Option<AlgoDayState>, StoreError>;

    /// Inserts the day's lock record. Fails with `Duplicate` if one already
    /// exists for (owner, day); the uniqueness constraint is what makes the
    /// one-lock-per-day rule hold even across processes.
    async fn insert_algo_day(&self, state: &AlgoDayState) -> Result<(), StoreError>;

    async fn set_algo_status(
        &self,
        owner_id: &str,
        trade_date: NaiveDate,
        status: AlgoRunStatus,
    ) -> Result<(), StoreError>;

    // --- risk limits ---

    async fn risk_limits(&self, owner_id: &str) -> Result<Option<RiskLimits>, StoreError>;

    async fn put_risk_limits(
        &self,
        owner_id: &str,
        limits: &RiskLimits,
    ) -> Result<(), StoreError>;

    // --- orders ---

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn order_by_broker_id(
        &self,
        owner_id: &str,
        broker_order_id: &str,
    ) -> Result<Option<Order>, StoreError>;

    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError>;

    /// Replaces the stored order row. The order must already exist.
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;

    // --- executions ---

    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError>;

    /// Whether any execution has been recorded for the order. This is the
    /// dedup check the live reconciler relies on.
    async fn has_execution_for_order(&self, order_id: Uuid) -> Result<bool, StoreError>;

    // --- positions ---

    async fn open_position(
        &self,
        owner_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, StoreError>;

    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError>;

    // --- wallets ---

    async fn wallet(&self, owner_id: &str) -> Result<Option<Wallet>, StoreError>;

    async fn put_wallet(&self, wallet: &Wallet) -> Result<(), StoreError>;

    // --- fills ---

    async fn record_fill(&self, fill: &FillRecord) -> Result<(), StoreError>;

    // --- operational log ---

    async fn record_system_event(&self, event: &SystemEvent) -> Result<(), StoreError>;
}
