use chrono::Utc;
use core_types::{OrderSide, Position, PositionStatus, Wallet};
use rust_decimal::Decimal;
use uuid::Uuid;

/// The position and wallet after a fill has been netted in, plus whatever
/// PnL the fill realized. Computed here, committed by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub position: Position,
    pub wallet: Wallet,
    pub realized_pnl: Decimal,
}

fn signed(side: OrderSide, quantity: Decimal) -> Decimal {
    match side {
        OrderSide::Buy => quantity,
        OrderSide::Sell => -quantity,
    }
}

/// The quantity by which an order grows absolute exposure. A fill nets
/// against the open position first; only what is left over opens new
/// exposure.
pub fn exposure_increase(
    position: Option<&Position>,
    side: OrderSide,
    quantity: Decimal,
) -> Decimal {
    let current = position.map(|p| p.quantity).unwrap_or(Decimal::ZERO);
    let fill = signed(side, quantity);
    if current.is_zero() || current.is_sign_positive() == fill.is_sign_positive() {
        return quantity;
    }
    (quantity - current.abs()).max(Decimal::ZERO)
}

/// Margin to admit an order: price times the exposure it adds, the same for
/// both sides. An order that only reduces an open position requires none.
pub fn required_margin(
    position: Option<&Position>,
    side: OrderSide,
    quantity: Decimal,
    ltp: Decimal,
) -> Decimal {
    ltp * exposure_increase(position, side, quantity)
}

/// Nets one fill into the owner's position and wallet.
///
/// Position quantities are signed: positive long, negative short. Relative
/// to the open position the fill is either
/// - flat or same direction: quantities add and the average price becomes
///   the weighted average of old and new;
/// - opposite and smaller: the position shrinks at an unchanged average and
///   the closed quantity realizes PnL;
/// - opposite and equal: the position closes;
/// - opposite and larger: the old position closes entirely and the
///   remainder opens fresh at the fill price.
///
/// The wallet moves the full notional between its two buckets: a BUY spends
/// available balance into used margin, a SELL releases it. Their sum never
/// changes across a fill.
pub fn apply_fill(
    symbol: &str,
    position: Option<Position>,
    mut wallet: Wallet,
    side: OrderSide,
    quantity: Decimal,
    price: Decimal,
) -> LedgerEntry {
    let now = Utc::now();
    let mut position = position.unwrap_or(Position {
        position_id: Uuid::new_v4(),
        owner_id: wallet.owner_id.clone(),
        symbol: symbol.to_string(),
        quantity: Decimal::ZERO,
        average_price: Decimal::ZERO,
        status: PositionStatus::Closed,
        updated_at: now,
    });

    let fill = signed(side, quantity);
    let current = position.quantity;
    let mut realized_pnl = Decimal::ZERO;

    if current.is_zero() || current.is_sign_positive() == fill.is_sign_positive() {
        let combined = current.abs() + quantity;
        position.average_price =
            (current.abs() * position.average_price + quantity * price) / combined;
        position.quantity = current + fill;
    } else {
        let closing = quantity.min(current.abs());
        realized_pnl = if current.is_sign_positive() {
            (price - position.average_price) * closing
        } else {
            (position.average_price - price) * closing
        };
        position.quantity = current + fill;
        if !position.quantity.is_zero()
            && position.quantity.is_sign_positive() != current.is_sign_positive()
        {
            // Reversal: what remains is a new position at the fill price.
            position.average_price = price;
        }
    }

    position.status = if position.quantity.is_zero() {
        PositionStatus::Closed
    } else {
        PositionStatus::Open
    };
    position.updated_at = now;

    let notional = quantity * price;
    match side {
        OrderSide::Buy => {
            wallet.available_balance -= notional;
            wallet.used_margin += notional;
        }
        OrderSide::Sell => {
            wallet.available_balance += notional;
            wallet.used_margin -= notional;
        }
    }
    wallet.updated_at = now;

    LedgerEntry {
        position,
        wallet,
        realized_pnl,
    }
}
