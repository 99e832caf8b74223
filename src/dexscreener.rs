// DexScreener API client for token prices and liquidity
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::price::PriceOracle;

const DEXSCREENER_BASE: &str = "https://api.dexscreener.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    pub url: Option<String>,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceNative")]
    pub price_native: Option<String>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    pub liquidity: Option<Liquidity>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
}

impl DexPair {
    pub fn price_usd(&self) -> Option<f64> {
        self.price_usd
            .as_ref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    pub fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity.as_ref().and_then(|l| l.usd)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

/// Pick the pair to quote for a token
///
/// Solana pairs where the token is the base asset win; among those the
/// deepest pool wins. Pump.fun curves/pools are preferred when liquidity
/// is not reported.
fn select_pair(pairs: Vec<DexPair>, mint: &str) -> Option<DexPair> {
    let mut candidates: Vec<DexPair> = pairs
        .into_iter()
        .filter(|p| p.chain_id == "solana" && p.base_token.address == mint)
        .collect();

    candidates.sort_by(|a, b| {
        let la = a.liquidity_usd().unwrap_or(0.0);
        let lb = b.liquidity_usd().unwrap_or(0.0);
        lb.partial_cmp(&la)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| is_pump_dex(b).cmp(&is_pump_dex(a)))
    });

    candidates.into_iter().next()
}

fn is_pump_dex(pair: &DexPair) -> bool {
    pair.dex_id == "pumpswap" || pair.dex_id == "pumpfun"
}

pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
}

impl DexScreenerClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: DEXSCREENER_BASE.to_string(),
        }
    }

    /// Fetch the preferred pair for a token
    pub async fn get_token_pair(&self, mint: &str) -> Result<Option<DexPair>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, mint);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Http(format!("DexScreener API error {}", resp.status())));
        }

        let data: TokenPairsResponse = resp.json().await?;
        let pair = data.pairs.and_then(|pairs| select_pair(pairs, mint));

        debug!(
            mint = %mint,
            dex = pair.as_ref().map(|p| p.dex_id.as_str()).unwrap_or("none"),
            "DexScreener pair lookup"
        );
        Ok(pair)
    }

    /// USD liquidity of the preferred pair, if the token trades anywhere
    pub async fn liquidity_usd(&self, mint: &str) -> Result<Option<f64>> {
        Ok(self.get_token_pair(mint).await?.and_then(|p| p.liquidity_usd()))
    }
}

impl Default for DexScreenerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for DexScreenerClient {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    async fn price(&self, token_address: &str) -> Result<Option<f64>> {
        Ok(self
            .get_token_pair(token_address)
            .await?
            .and_then(|p| p.price_usd()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    fn pair(dex: &str, base: &str, price: Option<&str>, liquidity: Option<f64>) -> DexPair {
        DexPair {
            chain_id: "solana".into(),
            dex_id: dex.into(),
            url: None,
            pair_address: format!("{}-pair", dex),
            base_token: BaseToken {
                address: base.into(),
                name: None,
                symbol: Some("POP".into()),
            },
            price_native: None,
            price_usd: price.map(String::from),
            liquidity: liquidity.map(|usd| Liquidity {
                usd: Some(usd),
                base: None,
                quote: None,
            }),
            market_cap: None,
        }
    }

    #[test]
    fn test_select_pair_prefers_deepest_pool() {
        let pairs = vec![
            pair("raydium", MINT, Some("0.1"), Some(5_000.0)),
            pair("pumpswap", MINT, Some("0.11"), Some(50_000.0)),
            pair("orca", "someOtherMint", Some("9.0"), Some(1_000_000.0)),
        ];
        let chosen = select_pair(pairs, MINT).unwrap();
        assert_eq!(chosen.dex_id, "pumpswap");
        assert_eq!(chosen.price_usd(), Some(0.11));
    }

    #[test]
    fn test_select_pair_prefers_pump_without_liquidity() {
        let pairs = vec![
            pair("meteora", MINT, Some("0.1"), None),
            pair("pumpfun", MINT, Some("0.2"), None),
        ];
        assert_eq!(select_pair(pairs, MINT).unwrap().dex_id, "pumpfun");
    }

    #[test]
    fn test_price_usd_parsing() {
        assert_eq!(pair("x", MINT, Some("0.0000205"), None).price_usd(), Some(0.0000205));
        assert_eq!(pair("x", MINT, Some("n/a"), None).price_usd(), None);
        assert_eq!(pair("x", MINT, None, None).price_usd(), None);
    }

    #[test]
    fn test_deserialize_pairs_response() {
        let body = format!(
            r#"{{"schemaVersion":"1.0.0","pairs":[{{"chainId":"solana","dexId":"raydium","url":"https://dexscreener.com/solana/abc","pairAddress":"abc","baseToken":{{"address":"{}","name":"Pop","symbol":"POP"}},"quoteToken":{{"address":"So11111111111111111111111111111111111111112","name":"Wrapped SOL","symbol":"SOL"}},"priceNative":"0.0005","priceUsd":"0.08","liquidity":{{"usd":12000.5,"base":1000,"quote":20}},"marketCap":80000}}]}}"#,
            MINT
        );
        let data: TokenPairsResponse = serde_json::from_str(&body).unwrap();
        let chosen = select_pair(data.pairs.unwrap(), MINT).unwrap();
        assert_eq!(chosen.liquidity_usd(), Some(12000.5));
        assert_eq!(chosen.price_usd(), Some(0.08));
    }
}
