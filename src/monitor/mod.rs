//! Background monitors
//!
//! Two independent polling loops:
//! - `PriceAlertMonitor` fires user price alerts, at most once each
//! - `TokenActivityMonitor` reports large buys and fee-wallet funding
//!
//! Each is an explicit service object with `start()`/`stop()`. A sweep
//! never fails as a whole: per-item errors are logged and skipped.

pub mod price_alert;
pub mod token_activity;

pub use price_alert::{PriceAlertMonitor, PriceSweepReport};
pub use token_activity::{FeeState, TokenActivityMonitor, TokenSweepReport, WatchedToken};

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::models::EventCategory;
use crate::notify::Notifier;
use crate::store::Store;

/// Bound one external call; elapsing counts as a per-item failure
pub(crate) async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(millis(limit))),
    }
}

/// Whole milliseconds in `limit`, saturating at `u64::MAX`
fn millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn log_item_failure(what: &str, item: &str, err: &Error) {
    if err.is_transient() {
        warn!(item = %item, "{} failed: {}", what, err);
    } else {
        error!(item = %item, "{} failed: {}", what, err);
    }
}

/// Best-effort delivery to a user's channel for `category`
///
/// Returns whether a message was delivered. Missing or disabled channels
/// are not errors.
pub(crate) async fn notify_user(
    store: &dyn Store,
    notifier: &dyn Notifier,
    limit: Duration,
    user_id: &str,
    category: EventCategory,
    message: &str,
) -> bool {
    let channel = match store.channel(user_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            debug!(user = %user_id, %category, "No notification channel configured");
            return false;
        }
        Err(e) => {
            log_item_failure("Channel lookup", user_id, &e);
            return false;
        }
    };

    let Some(destination) = channel.destination_for(category) else {
        debug!(user = %user_id, %category, "Notifications disabled for category");
        return false;
    };

    match with_timeout(limit, notifier.send(destination, message)).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                user = %user_id,
                %category,
                sink = notifier.name(),
                "Notification not delivered: {}",
                e
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelConfig;
    use crate::store::JsonStore;
    use crate::test_support::RecordingNotifier;

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result: Result<()> = with_timeout(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(20))));
    }

    #[test]
    fn test_timeout_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_notify_user_without_channel_is_noop() {
        let store = JsonStore::in_memory();
        let notifier = RecordingNotifier::new();

        let delivered = notify_user(
            &store,
            &notifier,
            Duration::from_secs(1),
            "nobody",
            EventCategory::LargeBuy,
            "hello",
        )
        .await;

        assert!(!delivered);
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_notify_user_swallows_send_failure() {
        let store = JsonStore::in_memory();
        store.upsert_channel(ChannelConfig::new("u1", "42")).await.unwrap();
        let notifier = RecordingNotifier::failing();

        let delivered = notify_user(
            &store,
            &notifier,
            Duration::from_secs(1),
            "u1",
            EventCategory::FeeReady,
            "hello",
        )
        .await;

        assert!(!delivered);
        assert_eq!(notifier.count(), 1);
    }
}
