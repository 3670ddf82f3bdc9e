use market_data::MarketDataError;
use rust_decimal::Decimal;
use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("No executable price: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Insufficient margin to execute trade. Required: {required}, Available: {available}")]
    InsufficientMargin {
        required: Decimal,
        available: Decimal,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
