use std::sync::Arc;

use chrono::Utc;
use configuration::PaperSettings;
use core_types::{
    Execution, Order, OrderRequest, OrderSide, OrderStatus, OrderType, Position, TradeMode,
    Wallet,
};
use events::EventBus;
use market_data::PriceSource;
use rust_decimal::Decimal;
use store::{FillRecord, Store};
use tracing::{info, warn};

use crate::error::ExecutorError;
use crate::ledger;

/// What came back from placing or sweeping one order.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub order: Order,
    /// PnL this fill realized, zero when nothing closed (or nothing filled).
    pub realized_pnl: Decimal,
}

/// The virtual execution engine for paper trading.
///
/// It prices orders off the live `PriceSource`, enforces the margin rule,
/// and commits fills through the store's atomic `record_fill`. The ledger
/// module computes what a fill does; this struct decides when and commits
/// the result.
pub struct PaperBroker {
    store: Arc<dyn Store>,
    prices: Arc<dyn PriceSource>,
    bus: EventBus,
    settings: PaperSettings,
}

impl PaperBroker {
    pub fn new(
        store: Arc<dyn Store>,
        prices: Arc<dyn PriceSource>,
        bus: EventBus,
        settings: PaperSettings,
    ) -> Self {
        Self {
            store,
            prices,
            bus,
            settings,
        }
    }

    /// Accepts one order: price it, check margin, persist it PENDING, and
    /// fill it immediately if it is a MARKET order. LIMIT orders rest until
    /// a sweep crosses them.
    pub async fn place_order(&self, request: &OrderRequest) -> Result<Placement, ExecutorError> {
        let ltp = self.prices.get_ltp(&request.symbol).await?;
        let wallet = self.wallet_for(&request.owner_id).await?;
        let position = self
            .store
            .open_position(&request.owner_id, &request.symbol)
            .await?;

        let required =
            ledger::required_margin(position.as_ref(), request.side, request.quantity, ltp);
        if required > wallet.available_balance {
            return Err(ExecutorError::InsufficientMargin {
                required,
                available: wallet.available_balance,
            });
        }

        let order = Order::pending(request, TradeMode::Paper);
        self.store.insert_order(&order).await?;

        match order.order_type {
            OrderType::Market => self.execute_fill(order, position, wallet, ltp).await,
            OrderType::Limit => {
                info!(
                    order_id = %order.order_id,
                    symbol = %order.symbol,
                    limit_price = ?order.limit_price,
                    "Paper limit order resting until a sweep crosses it."
                );
                self.bus.publish_order(order.clone());
                Ok(Placement {
                    order,
                    realized_pnl: Decimal::ZERO,
                })
            }
        }
    }

    /// One sweep over resting paper orders against current prices. Orders
    /// whose symbol cannot be priced right now stay PENDING for the next
    /// sweep.
    pub async fn sync_pending_orders(&self) -> Result<Vec<Placement>, ExecutorError> {
        let pending = self.store.orders_with_status(OrderStatus::Pending).await?;
        let mut fills = Vec::new();
        for order in pending {
            if order.mode != TradeMode::Paper {
                continue;
            }
            let ltp = match self.prices.get_ltp(&order.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(
                        error = %e,
                        order_id = %order.order_id,
                        "No price for pending order; leaving it for the next sweep."
                    );
                    continue;
                }
            };
            let Some(price) = fill_price(&order, ltp) else {
                continue;
            };
            let position = self
                .store
                .open_position(&order.owner_id, &order.symbol)
                .await?;
            let wallet = self.wallet_for(&order.owner_id).await?;
            fills.push(self.execute_fill(order, position, wallet, price).await?);
        }
        Ok(fills)
    }

    /// Applies one fill: the order goes FILLED, the ledger nets position and
    /// wallet, and all four rows commit as one store operation. The order
    /// update goes on the bus only after the commit.
    async fn execute_fill(
        &self,
        mut order: Order,
        position: Option<Position>,
        wallet: Wallet,
        price: Decimal,
    ) -> Result<Placement, ExecutorError> {
        order.status = OrderStatus::Filled;
        order.average_price = Some(price);
        order.filled_quantity = order.quantity;
        order.updated_at = Utc::now();

        let execution = Execution::for_order(&order, order.quantity, price);
        let entry = ledger::apply_fill(
            &order.symbol,
            position,
            wallet,
            order.side,
            order.quantity,
            price,
        );

        let fill = FillRecord {
            order: order.clone(),
            execution,
            position: entry.position,
            wallet: entry.wallet,
        };
        self.store.record_fill(&fill).await?;
        self.bus.publish_order(order.clone());
        info!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            price = %price,
            "Paper order filled."
        );

        Ok(Placement {
            order,
            realized_pnl: entry.realized_pnl,
        })
    }

    /// The owner's paper wallet, provisioned with the configured starting
    /// balance the first time the owner trades.
    async fn wallet_for(&self, owner_id: &str) -> Result<Wallet, ExecutorError> {
        if let Some(wallet) = self.store.wallet(owner_id).await? {
            return Ok(wallet);
        }
        let wallet = Wallet::with_balance(owner_id, self.settings.starting_balance);
        self.store.put_wallet(&wallet).await?;
        info!(
            owner_id,
            balance = %wallet.available_balance,
            "Provisioned paper wallet."
        );
        Ok(wallet)
    }
}

/// Whether an order crosses at the current price, and at what price it
/// fills. Limit orders always fill at their limit, never better.
fn fill_price(order: &Order, ltp: Decimal) -> Option<Decimal> {
    match (order.order_type, order.limit_price) {
        (OrderType::Market, _) => Some(ltp),
        (OrderType::Limit, Some(limit)) => match order.side {
            OrderSide::Buy if ltp <= limit => Some(limit),
            OrderSide::Sell if ltp >= limit => Some(limit),
            _ => None,
        },
        (OrderType::Limit, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use core_types::PositionStatus;
    use market_data::MarketDataError;
    use rust_decimal_macros::dec;
    use store::MemoryStore;
    use tokio::sync::Mutex;

    struct FixedPrices {
        prices: Mutex<HashMap<String, Decimal>>,
    }

    impl FixedPrices {
        fn with(symbol: &str, price: Decimal) -> Arc<Self> {
            Arc::new(Self {
                prices: Mutex::new(HashMap::from([(symbol.to_string(), price)])),
            })
        }

        async fn set(&self, symbol: &str, price: Decimal) {
            self.prices.lock().await.insert(symbol.to_string(), price);
        }

        async fn clear(&self, symbol: &str) {
            self.prices.lock().await.remove(symbol);
        }
    }

    #[async_trait]
    impl PriceSource for FixedPrices {
        async fn get_ltp(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
            self.prices
                .lock()
                .await
                .get(symbol)
                .copied()
                .ok_or_else(|| MarketDataError::Unavailable(symbol.to_string()))
        }
    }

    fn make_broker(
        prices: Arc<FixedPrices>,
    ) -> (PaperBroker, Arc<MemoryStore>, EventBus) {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(64);
        let broker = PaperBroker::new(
            store.clone(),
            prices,
            bus.clone(),
            PaperSettings {
                starting_balance: dec!(10000),
            },
        );
        (broker, store, bus)
    }

    #[tokio::test]
    async fn market_buy_fills_immediately_at_ltp() {
        let prices = FixedPrices::with("NIFTY 50", dec!(100));
        let (broker, store, bus) = make_broker(prices);
        let mut orders = bus.subscribe_orders();

        let request = OrderRequest::market("owner-1", "NIFTY 50", OrderSide::Buy, dec!(50));
        let placement = broker.place_order(&request).await.unwrap();

        assert_eq!(placement.order.status, OrderStatus::Filled);
        assert_eq!(placement.order.average_price, Some(dec!(100)));
        assert_eq!(placement.order.filled_quantity, dec!(50));
        assert_eq!(placement.realized_pnl, Decimal::ZERO);

        let position = store.open_position("owner-1", "NIFTY 50").await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(50));
        assert_eq!(position.average_price, dec!(100));
        assert_eq!(position.status, PositionStatus::Open);

        let wallet = store.wallet("owner-1").await.unwrap().unwrap();
        assert_eq!(wallet.available_balance, dec!(5000));
        assert_eq!(wallet.used_margin, dec!(5000));

        assert!(
            store
                .has_execution_for_order(placement.order.order_id)
                .await
                .unwrap()
        );
        assert_eq!(
            orders.recv().await.unwrap().status,
            OrderStatus::Filled
        );
    }

    #[tokio::test]
    async fn insufficient_margin_rejects_before_any_order_exists() {
        let prices = FixedPrices::with("NIFTY 50", dec!(100));
        let (broker, store, _bus) = make_broker(prices);

        let request = OrderRequest::market("owner-1", "NIFTY 50", OrderSide::Buy, dec!(200));
        let err = broker.place_order(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::InsufficientMargin { required, available }
                if required == dec!(20000) && available == dec!(10000)
        ));

        assert!(
            store
                .orders_with_status(OrderStatus::Pending)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            store
                .orders_with_status(OrderStatus::Filled)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn limit_buy_rests_then_fills_at_its_limit() {
        let prices = FixedPrices::with("NIFTY 50", dec!(100));
        let (broker, store, _bus) = make_broker(prices.clone());

        let request =
            OrderRequest::limit("owner-1", "NIFTY 50", OrderSide::Buy, dec!(10), dec!(95));
        let placement = broker.place_order(&request).await.unwrap();
        assert_eq!(placement.order.status, OrderStatus::Pending);

        // LTP still above the limit: the sweep leaves it alone.
        assert!(broker.sync_pending_orders().await.unwrap().is_empty());

        prices.set("NIFTY 50", dec!(94)).await;
        let fills = broker.sync_pending_orders().await.unwrap();
        assert_eq!(fills.len(), 1);
        // Fills at the limit, not at the better market price.
        assert_eq!(fills[0].order.average_price, Some(dec!(95)));
        assert_eq!(fills[0].order.status, OrderStatus::Filled);

        let position = store.open_position("owner-1", "NIFTY 50").await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(10));
        assert_eq!(position.average_price, dec!(95));

        let wallet = store.wallet("owner-1").await.unwrap().unwrap();
        assert_eq!(wallet.available_balance, dec!(9050));
        assert_eq!(wallet.used_margin, dec!(950));
    }

    #[tokio::test]
    async fn limit_sell_fills_when_ltp_reaches_the_limit() {
        let prices = FixedPrices::with("NIFTY 50", dec!(100));
        let (broker, _store, _bus) = make_broker(prices.clone());

        let request =
            OrderRequest::limit("owner-1", "NIFTY 50", OrderSide::Sell, dec!(5), dec!(105));
        broker.place_order(&request).await.unwrap();
        assert!(broker.sync_pending_orders().await.unwrap().is_empty());

        prices.set("NIFTY 50", dec!(106)).await;
        let fills = broker.sync_pending_orders().await.unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order.average_price, Some(dec!(105)));
    }

    #[tokio::test]
    async fn round_trip_realizes_pnl() {
        let prices = FixedPrices::with("NIFTY 50", dec!(100));
        let (broker, store, _bus) = make_broker(prices.clone());

        let buy = OrderRequest::market("owner-1", "NIFTY 50", OrderSide::Buy, dec!(10));
        broker.place_order(&buy).await.unwrap();

        prices.set("NIFTY 50", dec!(110)).await;
        let sell = OrderRequest::market("owner-1", "NIFTY 50", OrderSide::Sell, dec!(10));
        let placement = broker.place_order(&sell).await.unwrap();

        assert_eq!(placement.realized_pnl, dec!(100));
        let position = store.open_position("owner-1", "NIFTY 50").await.unwrap();
        assert!(position.is_none(), "flat position is no longer open");

        let wallet = store.wallet("owner-1").await.unwrap().unwrap();
        assert_eq!(wallet.total(), dec!(10000));
    }

    #[tokio::test]
    async fn wallet_is_provisioned_once() {
        let prices = FixedPrices::with("NIFTY 50", dec!(100));
        let (broker, store, _bus) = make_broker(prices);

        let first = OrderRequest::market("owner-1", "NIFTY 50", OrderSide::Buy, dec!(10));
        broker.place_order(&first).await.unwrap();
        let after_first = store.wallet("owner-1").await.unwrap().unwrap();
        assert_eq!(after_first.available_balance, dec!(9000));

        let second = OrderRequest::market("owner-1", "NIFTY 50", OrderSide::Buy, dec!(10));
        broker.place_order(&second).await.unwrap();
        let after_second = store.wallet("owner-1").await.unwrap().unwrap();
        // Spends accumulate on the same wallet instead of reseeding it.
        assert_eq!(after_second.available_balance, dec!(8000));
        assert_eq!(after_second.used_margin, dec!(2000));
    }

    #[tokio::test]
    async fn unpriceable_symbol_is_rejected() {
        let prices = FixedPrices::with("NIFTY 50", dec!(100));
        let (broker, _store, _bus) = make_broker(prices);

        let request = OrderRequest::market("owner-1", "NIFTY BANK", OrderSide::Buy, dec!(1));
        let err = broker.place_order(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::MarketData(MarketDataError::Unavailable(symbol)) if symbol == "NIFTY BANK"
        ));
    }

    #[tokio::test]
    async fn sweep_keeps_unpriceable_orders_pending() {
        let prices = FixedPrices::with("NIFTY 50", dec!(100));
        let (broker, store, _bus) = make_broker(prices.clone());

        let request =
            OrderRequest::limit("owner-1", "NIFTY 50", OrderSide::Buy, dec!(10), dec!(95));
        broker.place_order(&request).await.unwrap();

        prices.clear("NIFTY 50").await;
        assert!(broker.sync_pending_orders().await.unwrap().is_empty());
        assert_eq!(
            store
                .orders_with_status(OrderStatus::Pending)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
