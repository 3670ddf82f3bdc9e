use rust_decimal::Decimal;
use serde::Deserialize;

// The broker wraps every payload in a status envelope; `data` is the part
// we care about.

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: T,
}

/// The acknowledgement for a freshly placed order.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerOrderAck {
    pub order_id: String,
}

/// One row of the broker's order book.
///
/// `status` is in the broker's own vocabulary (`complete`, `rejected`,
/// `cancelled`, `open`, `trigger_pending`); translating it into our order
/// lifecycle is the reconciler's job, not this crate's.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    pub status: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub filled_quantity: Decimal,
    #[serde(default)]
    pub average_price: Decimal,
}

/// A single symbol's quote from the snapshot endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteData {
    pub last_price: Decimal,
}

/// The broker's error payload, sent with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerErrorResponse {
    pub status: String,
    pub message: String,
}
