use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::{
    AlgoDayState, AlgoRunStatus, Execution, Order, OrderStatus, Position, RiskLimits,
    SystemEvent, Wallet,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::interface::{FillRecord, Store};

/// The durable store, used for live trading and for paper sessions that
/// must survive a restart.
///
/// All statements go through the runtime query API with bound parameters;
/// the schema lives in `./migrations`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {err}"))
}

fn decode_algo_day(row: &PgRow) -> Result<AlgoDayState, StoreError> {
    Ok(AlgoDayState {
        owner_id: row.try_get("owner_id")?,
        trade_date: row.try_get("trade_date")?,
        algo: row
            .try_get::<String, _>("algo")?
            .parse()
            .map_err(|e| corrupt("algo_day_states.algo", e))?,
        mode: row
            .try_get::<String, _>("mode")?
            .parse()
            .map_err(|e| corrupt("algo_day_states.mode", e))?,
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e| corrupt("algo_day_states.status", e))?,
        locked_at: row.try_get("locked_at")?,
    })
}

fn decode_order(row: &PgRow) -> Result<Order, StoreError> {
    let algo: Option<String> = row.try_get("algo")?;
    Ok(Order {
        order_id: row.try_get("order_id")?,
        owner_id: row.try_get("owner_id")?,
        symbol: row.try_get("symbol")?,
        side: row
            .try_get::<String, _>("side")?
            .parse()
            .map_err(|e| corrupt("orders.side", e))?,
        quantity: row.try_get("quantity")?,
        order_type: row
            .try_get::<String, _>("order_type")?
            .parse()
            .map_err(|e| corrupt("orders.order_type", e))?,
        limit_price: row.try_get("limit_price")?,
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e| corrupt("orders.status", e))?,
        mode: row
            .try_get::<String, _>("mode")?
            .parse()
            .map_err(|e| corrupt("orders.mode", e))?,
        average_price: row.try_get("average_price")?,
        filled_quantity: row.try_get("filled_quantity")?,
        algo: algo
            .map(|a| a.parse().map_err(|e| corrupt("orders.algo", e)))
            .transpose()?,
        broker_order_id: row.try_get("broker_order_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_position(row: &PgRow) -> Result<Position, StoreError> {
    Ok(Position {
        position_id: row.try_get("position_id")?,
        owner_id: row.try_get("owner_id")?,
        symbol: row.try_get("symbol")?,
        quantity: row.try_get("quantity")?,
        average_price: row.try_get("average_price")?,
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e| corrupt("positions.status", e))?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_wallet(row: &PgRow) -> Result<Wallet, StoreError> {
    Ok(Wallet {
        owner_id: row.try_get("owner_id")?,
        available_balance: row.try_get("available_balance")?,
        used_margin: row.try_get("used_margin")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_risk_limits(row: &PgRow) -> Result<RiskLimits, StoreError> {
    Ok(RiskLimits {
        max_trades_per_day: row.try_get::<i32, _>("max_trades_per_day")? as u32,
        max_daily_loss_pct: row.try_get("max_daily_loss_pct")?,
        soft_stop_loss_pct: row.try_get("soft_stop_loss_pct")?,
        max_consecutive_losses: row.try_get::<i32, _>("max_consecutive_losses")? as u32,
        cooldown_seconds: row.try_get("cooldown_seconds")?,
        hard_stop_time: row.try_get("hard_stop_time")?,
        kill_switch: row.try_get("kill_switch")?,
    })
}

const INSERT_ORDER: &str = r#"
    INSERT INTO orders (
        order_id, owner_id, symbol, side, quantity, order_type, limit_price,
        status, mode, average_price, filled_quantity, algo, broker_order_id,
        created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
"#;

const UPDATE_ORDER: &str = r#"
    UPDATE orders
    SET status = $2, average_price = $3, filled_quantity = $4,
        broker_order_id = $5, updated_at = $6
    WHERE order_id = $1
"#;

const INSERT_EXECUTION: &str = r#"
    INSERT INTO executions (
        execution_id, order_id, owner_id, symbol, side, quantity, price, executed_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const UPSERT_POSITION: &str = r#"
    INSERT INTO positions (
        position_id, owner_id, symbol, quantity, average_price, status, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (position_id) DO UPDATE
    SET quantity = EXCLUDED.quantity,
        average_price = EXCLUDED.average_price,
        status = EXCLUDED.status,
        updated_at = EXCLUDED.updated_at
"#;

const UPSERT_WALLET: &str = r#"
    INSERT INTO wallets (owner_id, available_balance, used_margin, updated_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (owner_id) DO UPDATE
    SET available_balance = EXCLUDED.available_balance,
        used_margin = EXCLUDED.used_margin,
        updated_at = EXCLUDED.updated_at
"#;

#[async_trait]
impl Store for PgStore {
    async fn algo_day(
        &self,
        owner_id: &str,
        trade_date: NaiveDate,
    ) -> Result<Option<AlgoDayState>, StoreError> {
        let row = sqlx::query(
            "SELECT owner_id, trade_date, algo, mode, status, locked_at
             FROM algo_day_states WHERE owner_id = $1 AND trade_date = $2",
        )
        .bind(owner_id)
        .bind(trade_date)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_algo_day).transpose()
    }

    async fn insert_algo_day(&self, state: &AlgoDayState) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO algo_day_states (owner_id, trade_date, algo, mode, status, locked_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&state.owner_id)
        .bind(state.trade_date)
        .bind(state.algo.as_str())
        .bind(state.mode.as_str())
        .bind(state.status.as_str())
        .bind(state.locked_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate(format!(
                "algo day state for {} on {}",
                state.owner_id, state.trade_date
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_algo_status(
        &self,
        owner_id: &str,
        trade_date: NaiveDate,
        status: AlgoRunStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE algo_day_states SET status = $3
             WHERE owner_id = $1 AND trade_date = $2",
        )
        .bind(owner_id)
        .bind(trade_date)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "algo day state for {owner_id} on {trade_date}"
            )));
        }
        Ok(())
    }

    async fn risk_limits(&self, owner_id: &str) -> Result<Option<RiskLimits>, StoreError> {
        let row = sqlx::query(
            "SELECT max_trades_per_day, max_daily_loss_pct, soft_stop_loss_pct,
                    max_consecutive_losses, cooldown_seconds, hard_stop_time, kill_switch
             FROM risk_limits WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_risk_limits).transpose()
    }

    async fn put_risk_limits(
        &self,
        owner_id: &str,
        limits: &RiskLimits,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO risk_limits (
                 owner_id, max_trades_per_day, max_daily_loss_pct, soft_stop_loss_pct,
                 max_consecutive_losses, cooldown_seconds, hard_stop_time, kill_switch
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (owner_id) DO UPDATE
             SET max_trades_per_day = EXCLUDED.max_trades_per_day,
                 max_daily_loss_pct = EXCLUDED.max_daily_loss_pct,
                 soft_stop_loss_pct = EXCLUDED.soft_stop_loss_pct,
                 max_consecutive_losses = EXCLUDED.max_consecutive_losses,
                 cooldown_seconds = EXCLUDED.cooldown_seconds,
                 hard_stop_time = EXCLUDED.hard_stop_time,
                 kill_switch = EXCLUDED.kill_switch",
        )
        .bind(owner_id)
        .bind(limits.max_trades_per_day as i32)
        .bind(limits.max_daily_loss_pct)
        .bind(limits.soft_stop_loss_pct)
        .bind(limits.max_consecutive_losses as i32)
        .bind(limits.cooldown_seconds)
        .bind(limits.hard_stop_time)
        .bind(limits.kill_switch)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(INSERT_ORDER)
            .bind(order.order_id)
            .bind(&order.owner_id)
            .bind(&order.symbol)
            .bind(order.side.as_str())
            .bind(order.quantity)
            .bind(order.order_type.as_str())
            .bind(order.limit_price)
            .bind(order.status.as_str())
            .bind(order.mode.as_str())
            .bind(order.average_price)
            .bind(order.filled_quantity)
            .bind(order.algo.map(|a| a.as_str()))
            .bind(&order.broker_order_id)
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::Duplicate(format!("order {}", order.order_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_order).transpose()
    }

    async fn order_by_broker_id(
        &self,
        owner_id: &str,
        broker_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row =
            sqlx::query("SELECT * FROM orders WHERE owner_id = $1 AND broker_order_id = $2")
                .bind(owner_id)
                .bind(broker_order_id)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(decode_order).transpose()
    }

    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query("SELECT * FROM orders WHERE status = $1 ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_order).collect()
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(UPDATE_ORDER)
            .bind(order.order_id)
            .bind(order.status.as_str())
            .bind(order.average_price)
            .bind(order.filled_quantity)
            .bind(&order.broker_order_id)
            .bind(order.updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {}", order.order_id)));
        }
        Ok(())
    }

    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        sqlx::query(INSERT_EXECUTION)
            .bind(execution.execution_id)
            .bind(execution.order_id)
            .bind(&execution.owner_id)
            .bind(&execution.symbol)
            .bind(execution.side.as_str())
            .bind(execution.quantity)
            .bind(execution.price)
            .bind(execution.executed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn has_execution_for_order(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS present FROM executions WHERE order_id = $1 LIMIT 1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn open_position(
        &self,
        owner_id: &str,
        symbol: &str,
    ) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM positions
             WHERE owner_id = $1 AND symbol = $2 AND status = 'OPEN'
             ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(owner_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_position).transpose()
    }

    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError> {
        sqlx::query(UPSERT_POSITION)
            .bind(position.position_id)
            .bind(&position.owner_id)
            .bind(&position.symbol)
            .bind(position.quantity)
            .bind(position.average_price)
            .bind(position.status.as_str())
            .bind(position.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn wallet(&self, owner_id: &str) -> Result<Option<Wallet>, StoreError> {
        let row = sqlx::query("SELECT * FROM wallets WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_wallet).transpose()
    }

    async fn put_wallet(&self, wallet: &Wallet) -> Result<(), StoreError> {
        sqlx::query(UPSERT_WALLET)
            .bind(&wallet.owner_id)
            .bind(wallet.available_balance)
            .bind(wallet.used_margin)
            .bind(wallet.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_fill(&self, fill: &FillRecord) -> Result<(), StoreError> {
        // One transaction for the whole fill. Either every row lands or the
        // order stays exactly as it was.
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(UPDATE_ORDER)
            .bind(fill.order.order_id)
            .bind(fill.order.status.as_str())
            .bind(fill.order.average_price)
            .bind(fill.order.filled_quantity)
            .bind(&fill.order.broker_order_id)
            .bind(fill.order.updated_at)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "order {}",
                fill.order.order_id
            )));
        }

        sqlx::query(INSERT_EXECUTION)
            .bind(fill.execution.execution_id)
            .bind(fill.execution.order_id)
            .bind(&fill.execution.owner_id)
            .bind(&fill.execution.symbol)
            .bind(fill.execution.side.as_str())
            .bind(fill.execution.quantity)
            .bind(fill.execution.price)
            .bind(fill.execution.executed_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(UPSERT_POSITION)
            .bind(fill.position.position_id)
            .bind(&fill.position.owner_id)
            .bind(&fill.position.symbol)
            .bind(fill.position.quantity)
            .bind(fill.position.average_price)
            .bind(fill.position.status.as_str())
            .bind(fill.position.updated_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(UPSERT_WALLET)
            .bind(&fill.wallet.owner_id)
            .bind(fill.wallet.available_balance)
            .bind(fill.wallet.used_margin)
            .bind(fill.wallet.updated_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_system_event(&self, event: &SystemEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO system_events (event_id, component, severity, message, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.event_id)
        .bind(&event.component)
        .bind(event.severity.as_str())
        .bind(&event.message)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
