use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::PriceSource;

pub const COINMARKETCAP_API_BASE: &str = "https://pro-api.coinmarketcap.com";
const QUOTES_PATH: &str = "/v1/cryptocurrency/quotes/latest";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

type CmcRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Connection settings for the quotes endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoinMarketCapConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub symbol: String,
    pub convert: String,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for CoinMarketCapConfig {
    fn default() -> Self {
        Self {
            base_url: COINMARKETCAP_API_BASE.to_string(),
            api_key: None,
            symbol: "BTC".to_string(),
            convert: "USD".to_string(),
            requests_per_minute: 30,
            timeout_secs: 10,
        }
    }
}

/// CoinMarketCap latest-quote client
///
/// One request per fetch, no retries: a failed fetch is reported and the
/// caller simply tries again on its next tick.
#[derive(Clone)]
pub struct CoinMarketCapClient {
    client: Client,
    url: String,
    api_key: String,
    symbol: String,
    convert: String,
    rate_limiter: Arc<CmcRateLimiter>,
}

impl CoinMarketCapClient {
    pub fn new(config: &CoinMarketCapConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("CoinMarketCap API key is not configured")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let rpm = NonZeroU32::new(config.requests_per_minute)
            .context("requests_per_minute must be greater than zero")?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            url: format!("{}{}", config.base_url.trim_end_matches('/'), QUOTES_PATH),
            api_key,
            symbol: config.symbol.to_uppercase(),
            convert: config.convert.to_uppercase(),
            rate_limiter,
        })
    }

    /// Latest price of the configured symbol in the configured currency
    pub async fn get_price(&self) -> Result<f64> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("symbol", self.symbol.as_str()), ("convert", self.convert.as_str())])
            .send()
            .await
            .context("CoinMarketCap request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("CoinMarketCap API error ({}): {}", status, body);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse CoinMarketCap response")?;

        self.extract_price(&body)
    }

    fn extract_price(&self, body: &Value) -> Result<f64> {
        let price = body
            .get("data")
            .and_then(|d| d.get(&self.symbol))
            .and_then(|s| s.get("quote"))
            .and_then(|q| q.get(&self.convert))
            .and_then(|c| c.get("price"))
            .and_then(Value::as_f64)
            .with_context(|| {
                format!(
                    "No {} price for {} in CoinMarketCap response",
                    self.convert, self.symbol
                )
            })?;

        tracing::debug!(symbol = %self.symbol, price, "CoinMarketCap quote");
        Ok(price)
    }
}

#[async_trait]
impl PriceSource for CoinMarketCapClient {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn fetch(&self) -> Result<f64> {
        self.get_price().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(base_url: String) -> CoinMarketCapConfig {
        CoinMarketCapConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            ..Default::default()
        }
    }

    fn quote_body(price: f64) -> String {
        serde_json::json!({
            "status": { "error_code": 0 },
            "data": {
                "BTC": {
                    "symbol": "BTC",
                    "quote": { "USD": { "price": price } }
                }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_get_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", QUOTES_PATH)
            .match_header(API_KEY_HEADER, "test-key")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTC".into()),
                Matcher::UrlEncoded("convert".into(), "USD".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(quote_body(27_123.45))
            .create_async()
            .await;

        let client = CoinMarketCapClient::new(&config(server.url())).unwrap();
        let price = client.fetch().await.unwrap();

        assert_eq!(price, 27_123.45);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_200_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", QUOTES_PATH)
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"status":{"error_message":"API key missing."}}"#)
            .create_async()
            .await;

        let client = CoinMarketCapClient::new(&config(server.url())).unwrap();
        let err = client.get_price().await.unwrap_err();

        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_missing_quote_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", QUOTES_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":{}}"#)
            .create_async()
            .await;

        let client = CoinMarketCapClient::new(&config(server.url())).unwrap();
        let err = client.get_price().await.unwrap_err();

        assert!(err.to_string().contains("No USD price for BTC"));
    }

    #[test]
    fn test_requires_api_key() {
        let config = CoinMarketCapConfig::default();
        let err = CoinMarketCapClient::new(&config).err().unwrap();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_symbol_is_uppercased() {
        let config = CoinMarketCapConfig {
            api_key: Some("k".to_string()),
            symbol: "eth".to_string(),
            ..Default::default()
        };
        let client = CoinMarketCapClient::new(&config).unwrap();
        assert_eq!(client.symbol(), "ETH");
    }

    #[tokio::test]
    #[ignore] // Requires COINMARKETCAP_API_KEY and network
    async fn test_get_price_live() {
        let config = CoinMarketCapConfig {
            api_key: std::env::var("COINMARKETCAP_API_KEY").ok(),
            ..Default::default()
        };
        let client = CoinMarketCapClient::new(&config).unwrap();

        assert!(client.get_price().await.unwrap() > 0.0);
    }
}
