//! Price alert monitor
//!
//! Polls every pending alert on a fixed cadence and fires it when the
//! current price crosses the target. Firing is a single store transition;
//! the notification after it is best-effort and never undoes it.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{log_item_failure, notify_user, with_timeout};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::models::{EventCategory, WatchedAlert};
use crate::notify::{message, Notifier};
use crate::price::PriceOracle;
use crate::store::Store;

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceSweepReport {
    /// Pending alerts looked at
    pub checked: usize,
    /// Alerts that transitioned to triggered this sweep
    pub triggered: usize,
    /// Alerts skipped because no price could be obtained
    pub skipped: usize,
    /// Notifications delivered
    pub notified: usize,
}

enum AlertOutcome {
    NoPrice,
    NotCrossed,
    AlreadyTriggered,
    Triggered { notified: bool },
}

pub struct PriceAlertMonitor {
    store: Arc<dyn Store>,
    oracle: Arc<dyn PriceOracle>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    shutdown: broadcast::Sender<()>,
}

impl PriceAlertMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        oracle: Arc<dyn PriceOracle>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);

        Self {
            store,
            oracle,
            notifier,
            config,
            shutdown,
        }
    }

    /// Start the polling loop
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        info!(
            "Starting price alert monitor ({}s interval, oracle: {})",
            self.config.price_alert_interval_secs,
            self.oracle.name()
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.price_alert_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = monitor.sweep().await;
                        if report.triggered > 0 {
                            info!(
                                checked = report.checked,
                                triggered = report.triggered,
                                notified = report.notified,
                                "Price alert sweep"
                            );
                        } else {
                            debug!(checked = report.checked, skipped = report.skipped, "Price alert sweep");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Price alert monitor shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Stop scheduling sweeps; a running sweep finishes
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    /// One pass over all pending alerts
    pub async fn sweep(&self) -> PriceSweepReport {
        let mut report = PriceSweepReport::default();

        if self.config.reload_from_store {
            if let Err(e) = self.store.refresh().await {
                warn!("Could not refresh store, using cached alerts: {}", e);
            }
        }

        let alerts = match self.store.active_alerts().await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!("Could not list active alerts: {}", e);
                return report;
            }
        };

        for alert in alerts.iter().filter(|a| a.is_pending()) {
            report.checked += 1;

            match self.check_alert(alert).await {
                Ok(AlertOutcome::NoPrice) => report.skipped += 1,
                Ok(AlertOutcome::NotCrossed) | Ok(AlertOutcome::AlreadyTriggered) => {}
                Ok(AlertOutcome::Triggered { notified }) => {
                    report.triggered += 1;
                    if notified {
                        report.notified += 1;
                    }
                }
                Err(e) => {
                    report.skipped += 1;
                    log_item_failure("Price alert check", &alert.id, &e);
                }
            }
        }

        report
    }

    async fn check_alert(&self, alert: &WatchedAlert) -> Result<AlertOutcome> {
        let limit = self.config.item_timeout();

        let Some(price) = with_timeout(limit, self.oracle.price(&alert.token_address)).await? else {
            debug!(alert_id = %alert.id, token = %alert.token_address, "No price available");
            return Ok(AlertOutcome::NoPrice);
        };

        if !alert.should_trigger(price) {
            return Ok(AlertOutcome::NotCrossed);
        }

        if !self.store.mark_alert_triggered(&alert.id, price).await? {
            return Ok(AlertOutcome::AlreadyTriggered);
        }

        info!(
            alert_id = %alert.id,
            user = %alert.user_id,
            symbol = %alert.token_symbol,
            target = alert.target_price,
            price,
            direction = %alert.direction,
            "Price alert triggered"
        );

        let text = message::price_alert(alert, price);
        let notified = notify_user(
            self.store.as_ref(),
            self.notifier.as_ref(),
            limit,
            &alert.user_id,
            EventCategory::PriceAlert,
            &text,
        )
        .await;

        Ok(AlertOutcome::Triggered { notified })
    }
}
