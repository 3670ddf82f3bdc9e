use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    /// Neither the active feed's cache nor its snapshot path could price the
    /// symbol.
    #[error("No market data available for symbol '{0}'")]
    Unavailable(String),

    #[error("Broker feed requires a session token")]
    NoSession,
}
