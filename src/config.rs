//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
    /// Jupiter price endpoint, queried as `{jupiter_url}?ids={mint}`
    #[serde(default = "default_jupiter_url")]
    pub jupiter_url: String,
    /// Ask DexScreener when Jupiter has no price
    #[serde(default = "default_true")]
    pub dexscreener_fallback: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            jupiter_url: default_jupiter_url(),
            dexscreener_fallback: true,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; empty means notifications are only logged
    #[serde(default = "default_bot_token")]
    pub bot_token: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: default_bot_token(),
            api_base: default_telegram_api(),
        }
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty()
    }
}

/// Monitor cadence and thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_price_alert_interval")]
    pub price_alert_interval_secs: u64,
    #[serde(default = "default_token_activity_interval")]
    pub token_activity_interval_secs: u64,
    /// Signatures fetched per token per sweep
    #[serde(default = "default_signature_page_size")]
    pub signature_page_size: usize,
    /// Minimum token units received in one transaction to count as a large buy
    #[serde(default = "default_large_buy_threshold")]
    pub large_buy_threshold: f64,
    /// Fee wallet balance (SOL) that counts as "ready to claim"
    #[serde(default = "default_fee_ready_threshold")]
    pub fee_ready_threshold_sol: f64,
    /// Upper bound for the external work done for one item in a sweep
    #[serde(default = "default_item_timeout_ms")]
    pub item_timeout_ms: u64,
    /// Save watermarks and fee balances alongside token configs
    #[serde(default)]
    pub persist_cursors: bool,
    /// Re-read the store before each tick so CLI edits are picked up
    #[serde(default = "default_true")]
    pub reload_from_store: bool,
}

impl MonitorConfig {
    pub fn price_alert_interval(&self) -> Duration {
        Duration::from_secs(self.price_alert_interval_secs)
    }

    pub fn token_activity_interval(&self) -> Duration {
        Duration::from_secs(self.token_activity_interval_secs)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            price_alert_interval_secs: default_price_alert_interval(),
            token_activity_interval_secs: default_token_activity_interval(),
            signature_page_size: default_signature_page_size(),
            large_buy_threshold: default_large_buy_threshold(),
            fee_ready_threshold_sol: default_fee_ready_threshold(),
            item_timeout_ms: default_item_timeout_ms(),
            persist_cursors: false,
            reload_from_store: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("SOLANA_RPC_URL")
        .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_jupiter_url() -> String {
    "https://lite-api.jup.ag/price/v2".into()
}

fn default_bot_token() -> String {
    std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default()
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".into()
}

fn default_price_alert_interval() -> u64 {
    60
}

fn default_token_activity_interval() -> u64 {
    30
}

fn default_signature_page_size() -> usize {
    20
}

fn default_large_buy_threshold() -> f64 {
    10_000.0
}

fn default_fee_ready_threshold() -> f64 {
    0.01
}

fn default_item_timeout_ms() -> u64 {
    5000
}

fn default_store_path() -> String {
    "data/feewatch.json".into()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix FEEWATCH_)
            .add_source(
                config::Environment::with_prefix("FEEWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.timeout_ms == 0 || self.price.timeout_ms == 0 {
            anyhow::bail!("timeouts must be positive");
        }

        let m = &self.monitor;
        if m.price_alert_interval_secs == 0 || m.token_activity_interval_secs == 0 {
            anyhow::bail!("monitor intervals must be positive");
        }

        if m.signature_page_size == 0 || m.signature_page_size > 1000 {
            anyhow::bail!(
                "signature_page_size must be between 1 and 1000, got {}",
                m.signature_page_size
            );
        }

        if m.large_buy_threshold <= 0.0 {
            anyhow::bail!("large_buy_threshold must be positive");
        }

        if m.fee_ready_threshold_sol <= 0.0 {
            anyhow::bail!("fee_ready_threshold_sol must be positive");
        }

        if m.item_timeout_ms == 0 {
            anyhow::bail!("item_timeout_ms must be positive");
        }

        if self.store.path.trim().is_empty() {
            anyhow::bail!("store.path must not be empty");
        }

        if !self.telegram.is_configured() {
            tracing::warn!("No Telegram bot token configured - notifications will only be logged");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Price:
    jupiter_url: {}
    dexscreener_fallback: {}
  Telegram:
    bot_token: {}
    api_base: {}
  Monitor:
    price_alert_interval: {}s
    token_activity_interval: {}s
    signature_page_size: {}
    large_buy_threshold: {} tokens
    fee_ready_threshold: {} SOL
    item_timeout: {}ms
    persist_cursors: {}
  Store:
    path: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            mask_url(&self.price.jupiter_url),
            self.price.dexscreener_fallback,
            if self.telegram.is_configured() {
                "***"
            } else {
                "(not set)"
            },
            self.telegram.api_base,
            self.monitor.price_alert_interval_secs,
            self.monitor.token_activity_interval_secs,
            self.monitor.signature_page_size,
            self.monitor.large_buy_threshold,
            self.monitor.fee_ready_threshold_sol,
            self.monitor.item_timeout_ms,
            self.monitor.persist_cursors,
            self.store.path,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
