use algo_state::AlgoStateError;
use broker_client::BrokerError;
use core_types::CoreError;
use executor::ExecutorError;
use market_data::MarketDataError;
use risk::RiskRejection;
use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid order request: {0}")]
    Validation(#[from] CoreError),

    #[error("No algo is running for '{0}' today")]
    AlgoNotRunning(String),

    #[error("No algo day context for '{0}'; lock a strategy first")]
    MissingContext(String),

    #[error("Trade rejected: {0}")]
    RiskRejected(#[from] RiskRejection),

    #[error(transparent)]
    AlgoState(#[from] AlgoStateError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Market data failure: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Broker call failed: {0}")]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
