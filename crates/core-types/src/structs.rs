use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{
    AlgoId, AlgoRunStatus, OrderSide, OrderStatus, OrderType, PositionStatus, TickSource,
    TradeMode,
};
use crate::error::CoreError;

/// A single last-traded-price observation for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: TickSource,
}

impl MarketTick {
    pub fn new(symbol: impl Into<String>, price: Decimal, source: TickSource) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
            source,
        }
    }
}

/// What a strategy wants done, before the engine attaches ownership and
/// routing detail to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
}

/// What a caller asks the order router for. Everything else on an `Order`
/// is derived during placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub owner_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    /// The strategy that produced this request, if any.
    pub algo: Option<AlgoId>,
}

impl OrderRequest {
    pub fn market(
        owner_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            algo: None,
        }
    }

    pub fn limit(
        owner_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            algo: None,
        }
    }

    /// Structural validation, applied before any component acts on the
    /// request.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.owner_id.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "owner_id".to_string(),
                "must not be empty".to_string(),
            ));
        }
        if self.symbol.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "symbol".to_string(),
                "must not be empty".to_string(),
            ));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidInput(
                "quantity".to_string(),
                format!("must be positive, got {}", self.quantity),
            ));
        }
        match (self.order_type, self.limit_price) {
            (OrderType::Limit, None) => Err(CoreError::InvalidInput(
                "limit_price".to_string(),
                "required for LIMIT orders".to_string(),
            )),
            (OrderType::Limit, Some(p)) if p <= Decimal::ZERO => Err(CoreError::InvalidInput(
                "limit_price".to_string(),
                format!("must be positive, got {p}"),
            )),
            (OrderType::Market, Some(_)) => Err(CoreError::InvalidInput(
                "limit_price".to_string(),
                "not allowed for MARKET orders".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// An order as tracked locally, whether it targets the paper broker or is an
/// audit record of a live broker order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub owner_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub status: OrderStatus,
    pub mode: TradeMode,
    pub average_price: Option<Decimal>,
    pub filled_quantity: Decimal,
    pub algo: Option<AlgoId>,
    /// Set only for live orders, with the id the broker assigned.
    pub broker_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A freshly accepted, not yet executed order.
    pub fn pending(request: &OrderRequest, mode: TradeMode) -> Self {
        let now = Utc::now();
        Self {
            order_id: Uuid::new_v4(),
            owner_id: request.owner_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            order_type: request.order_type,
            limit_price: request.limit_price,
            status: OrderStatus::Pending,
            mode,
            average_price: None,
            filled_quantity: Decimal::ZERO,
            algo: request.algo,
            broker_order_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One fill against an order. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: Uuid,
    pub order_id: Uuid,
    pub owner_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl Execution {
    pub fn for_order(order: &Order, quantity: Decimal, price: Decimal) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            order_id: order.order_id,
            owner_id: order.owner_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity,
            price,
            executed_at: Utc::now(),
        }
    }
}

/// Net exposure in one symbol. `quantity` is signed: positive long,
/// negative short, zero flat (and then `status` is `Closed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub owner_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub status: PositionStatus,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// The paper cash ledger for one owner.
///
/// `available_balance + used_margin` is invariant across fills; funds only
/// move between the two buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner_id: String,
    pub available_balance: Decimal,
    pub used_margin: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn with_balance(owner_id: impl Into<String>, balance: Decimal) -> Self {
        Self {
            owner_id: owner_id.into(),
            available_balance: balance,
            used_margin: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.available_balance + self.used_margin
    }
}

/// The once-per-day strategy selection for one owner. Written when the lock
/// is taken; only `status` may change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoDayState {
    pub owner_id: String,
    pub trade_date: NaiveDate,
    pub algo: AlgoId,
    pub mode: TradeMode,
    pub status: AlgoRunStatus,
    pub locked_at: DateTime<Utc>,
}

/// Risk limits for one owner. Seeded from configuration defaults and
/// refreshed from the store snapshot before every gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_trades_per_day: u32,
    /// Daily loss, as a positive percentage of the capital base, at which
    /// trading halts.
    pub max_daily_loss_pct: Decimal,
    /// Warning threshold, also a positive percentage. Crossing it never
    /// blocks a trade.
    pub soft_stop_loss_pct: Decimal,
    pub max_consecutive_losses: u32,
    pub cooldown_seconds: i64,
    /// Time of day after which no new trades are accepted.
    pub hard_stop_time: NaiveTime,
    pub kill_switch: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_trades_per_day: 25,
            max_daily_loss_pct: dec!(2.0),
            soft_stop_loss_pct: dec!(1.0),
            max_consecutive_losses: 4,
            cooldown_seconds: 60,
            hard_stop_time: NaiveTime::from_hms_opt(15, 15, 0)
                .expect("15:15:00 is a valid time of day"),
            kill_switch: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::Error => "error",
            EventSeverity::Critical => "critical",
        }
    }
}

/// An operational event worth keeping: engine start/stop, feed switches,
/// risk warnings, reconciler repairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub event_id: Uuid,
    pub component: String,
    pub severity: EventSeverity,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl SystemEvent {
    pub fn new(
        component: impl Into<String>,
        severity: EventSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            component: component.into(),
            severity,
            message: message.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
