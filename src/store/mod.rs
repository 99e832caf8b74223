//! Persistence for watch records
//!
//! The monitors only need a handful of reads and one write (the trigger
//! transition), so the store is a small trait. `JsonStore` is the
//! file-backed implementation used by the binary.

mod json;

pub use json::JsonStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChannelConfig, NewAlert, TokenConfig, WatchedAlert};

#[async_trait]
pub trait Store: Send + Sync {
    /// Pick up changes written by other processes
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Alerts that are active and not yet triggered
    async fn active_alerts(&self) -> Result<Vec<WatchedAlert>>;

    /// All alerts, optionally only those of one user
    async fn alerts(&self, user_id: Option<&str>) -> Result<Vec<WatchedAlert>>;

    async fn insert_alert(&self, alert: NewAlert) -> Result<WatchedAlert>;

    /// Returns false if no alert had this id
    async fn delete_alert(&self, id: &str) -> Result<bool>;

    /// Flip `is_triggered` once. Returns true only for the call that flipped it.
    async fn mark_alert_triggered(&self, id: &str, price: f64) -> Result<bool>;

    async fn token_configs(&self) -> Result<Vec<TokenConfig>>;

    /// Insert or replace the config of `config.user_id`
    async fn upsert_token_config(&self, config: TokenConfig) -> Result<()>;

    async fn remove_token_config(&self, user_id: &str) -> Result<bool>;

    /// Save monitor cursors for a user's token; ignored if the mint no longer matches
    async fn save_token_cursor(
        &self,
        user_id: &str,
        mint: &str,
        last_checked_signature: Option<String>,
        last_checked_slot: Option<u64>,
        last_fee_balance: Option<f64>,
    ) -> Result<()>;

    async fn channel(&self, user_id: &str) -> Result<Option<ChannelConfig>>;

    async fn channels(&self) -> Result<Vec<ChannelConfig>>;

    async fn upsert_channel(&self, channel: ChannelConfig) -> Result<()>;
}
