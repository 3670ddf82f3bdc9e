use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use configuration::BrokerSettings;
use core_types::OrderRequest;
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod error;
pub mod responses;

// --- Public API ---
pub use error::BrokerError;
pub use responses::{BrokerOrder, BrokerOrderAck, BrokerErrorResponse, Envelope, QuoteData};

/// The generic, abstract interface to the live broker.
///
/// This trait is the contract the order router and market data router use,
/// allowing the underlying implementation (HTTP or a test double) to be
/// swapped out. The broker's wire protocol never leaks past this seam.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Whether an authenticated session is available. The market data
    /// router consults this when choosing a feed.
    fn has_session(&self) -> bool;

    /// The raw session token, for the quote stream's connection URL.
    fn session_token(&self) -> Option<String>;

    /// Places an order and returns the id the broker assigned. (Authenticated)
    async fn place_order(&self, order: &OrderRequest) -> Result<BrokerOrderAck, BrokerError>;

    /// Fetches today's order book, statuses in the broker's vocabulary. (Authenticated)
    async fn order_book(&self) -> Result<Vec<BrokerOrder>, BrokerError>;

    /// Fetches snapshot last-traded prices for the given symbols.
    async fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>, BrokerError>;
}

/// The shape of our order-placement request on the wire.
#[derive(Debug, Serialize)]
struct PlaceOrderBody<'a> {
    symbol: &'a str,
    side: &'a str,
    order_type: &'a str,
    quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
}

/// A concrete implementation of `BrokerClient` over the broker's REST API.
#[derive(Clone)]
pub struct HttpBrokerClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpBrokerClient {
    /// Builds the client. `access_token` is the session token for the day;
    /// passing `None` produces a client that can serve public endpoints
    /// but reports no session.
    pub fn new(settings: &BrokerSettings, access_token: Option<String>) -> Result<Self, BrokerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn bearer(&self) -> Result<&str, BrokerError> {
        self.access_token.as_deref().ok_or(BrokerError::NoSession)
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BrokerError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text)
                .map_err(|e| BrokerError::Deserialization(e.to_string()))
        } else {
            // Prefer the broker's own message; fall back to the raw body.
            let message = serde_json::from_str::<BrokerErrorResponse>(&text)
                .map(|e| e.message)
                .unwrap_or(text);
            Err(BrokerError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn _get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.bearer()?)
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn _post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bearer()?)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    fn has_session(&self) -> bool {
        self.access_token.is_some()
    }

    fn session_token(&self) -> Option<String> {
        self.access_token.clone()
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<BrokerOrderAck, BrokerError> {
        let body = PlaceOrderBody {
            symbol: &order.symbol,
            side: order.side.as_str(),
            order_type: order.order_type.as_str(),
            quantity: order.quantity,
            limit_price: order.limit_price,
            tag: order.algo.map(|a| a.as_str()),
        };

        let ack: Envelope<BrokerOrderAck> = self._post("/orders", &body).await?;
        Ok(ack.data)
    }

    async fn order_book(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let book: Envelope<Vec<BrokerOrder>> = self._get("/orders", &[]).await?;
        Ok(book.data)
    }

    async fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>, BrokerError> {
        let query = [("symbols", symbols.join(","))];
        let quotes: Envelope<HashMap<String, QuoteData>> =
            self._get("/quotes", &query).await?;
        Ok(quotes
            .data
            .into_iter()
            .map(|(symbol, quote)| (symbol, quote.last_price))
            .collect())
    }
}
