//! Price lookup
//!
//! `PriceOracle` answers "what is this token worth in USD right now".
//! `None` means the provider had no price; `Err` means the lookup itself
//! failed. The price alert monitor treats both as "skip this cycle".

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::PriceConfig;
use crate::dexscreener::DexScreenerClient;
use crate::error::{Error, Result};

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    async fn price(&self, token_address: &str) -> Result<Option<f64>>;
}

/// Jupiter Price API v2 response
#[derive(Debug, Deserialize)]
struct JupiterPriceResponse {
    #[serde(default)]
    data: HashMap<String, Option<JupiterPrice>>,
}

#[derive(Debug, Deserialize)]
struct JupiterPrice {
    #[serde(default)]
    price: Option<String>,
}

/// Jupiter price client
pub struct JupiterPriceClient {
    client: Client,
    base_url: String,
}

impl JupiterPriceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

/// Pull the price of `token_address` out of a Jupiter response body
fn parse_jupiter_price(body: &str, token_address: &str) -> Result<Option<f64>> {
    let response: JupiterPriceResponse = serde_json::from_str(body)
        .map_err(|e| Error::Price(format!("unexpected Jupiter response: {}", e)))?;

    let price = response
        .data
        .get(token_address)
        .and_then(|entry| entry.as_ref())
        .and_then(|entry| entry.price.as_deref())
        .and_then(|p| p.parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p > 0.0);

    Ok(price)
}

#[async_trait]
impl PriceOracle for JupiterPriceClient {
    fn name(&self) -> &'static str {
        "jupiter"
    }

    async fn price(&self, token_address: &str) -> Result<Option<f64>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("ids", token_address)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Price(format!("Jupiter API error {}: {}", status, body)));
        }

        let body = response.text().await?;
        let price = parse_jupiter_price(&body, token_address)?;
        debug!(token = %token_address, ?price, "Jupiter price");
        Ok(price)
    }
}

/// Ask `primary`, then `secondary` when the primary has no price or fails
pub struct FallbackOracle {
    primary: Arc<dyn PriceOracle>,
    secondary: Arc<dyn PriceOracle>,
}

impl FallbackOracle {
    pub fn new(primary: Arc<dyn PriceOracle>, secondary: Arc<dyn PriceOracle>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl PriceOracle for FallbackOracle {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn price(&self, token_address: &str) -> Result<Option<f64>> {
        let primary_err = match self.primary.price(token_address).await {
            Ok(Some(price)) => return Ok(Some(price)),
            Ok(None) => None,
            Err(e) => Some(e),
        };

        debug!(
            token = %token_address,
            primary = self.primary.name(),
            secondary = self.secondary.name(),
            "Primary oracle had no price, trying secondary"
        );

        match self.secondary.price(token_address).await {
            Ok(price) => Ok(price),
            // Report the first failure; it is usually the more useful one
            Err(e) => Err(primary_err.unwrap_or(e)),
        }
    }
}

/// Build the oracle described by the price config
pub fn build_oracle(config: &PriceConfig) -> Result<Arc<dyn PriceOracle>> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let jupiter: Arc<dyn PriceOracle> =
        Arc::new(JupiterPriceClient::new(config.jupiter_url.clone(), timeout)?);

    if config.dexscreener_fallback {
        let dexscreener: Arc<dyn PriceOracle> = Arc::new(DexScreenerClient::with_timeout(timeout));
        Ok(Arc::new(FallbackOracle::new(jupiter, dexscreener)))
    } else {
        Ok(jupiter)
    }
}
