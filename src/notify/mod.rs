//! Notification delivery
//!
//! A `Notifier` sends a preformatted message to a destination (a Telegram
//! chat id). Callers swallow delivery failures; nothing is retried.

pub mod message;
mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::TelegramConfig;
use crate::error::Result;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &'static str;

    async fn send(&self, destination: &str, message: &str) -> Result<()>;
}

/// Logs messages instead of delivering them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        info!(destination = %destination, "[notification] {}", message);
        Ok(())
    }
}

/// Telegram when a bot token is configured and this is not a dry run
pub fn build_notifier(config: &TelegramConfig, dry_run: bool) -> Result<Arc<dyn Notifier>> {
    if dry_run || !config.is_configured() {
        info!("Notifications will be logged, not sent");
        return Ok(Arc::new(LogNotifier));
    }

    Ok(Arc::new(TelegramNotifier::new(
        config.bot_token.clone(),
        config.api_base.clone(),
    )?))
}
