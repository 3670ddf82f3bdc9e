use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to build or send the HTTP request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("No broker session token is available")]
    NoSession,

    #[error("The broker rejected the request (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to deserialize the broker response: {0}")]
    Deserialization(String),
}
