//! Token activity monitor
//!
//! Each tick runs two independent passes over the watched tokens:
//!
//! 1. Transaction sweep. Pages recent signatures for the mint, processes
//!    everything newer than the per-token watermark (oldest first) and
//!    reports buys of at least `large_buy_threshold` tokens.
//! 2. Fee sweep. Reads the SOL balance of each token's fee wallet and
//!    notifies once when it rises to `fee_ready_threshold_sol`.
//!
//! The first sighting of a token only sets its watermark; history that
//! predates the watch is never reported. The watermark never moves to an
//! older slot: a page whose head is older than the watermark (a lagging
//! RPC node) is dropped unprocessed.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{log_item_failure, notify_user, with_timeout};
use crate::chain::{ChainSource, SignatureInfo};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::models::{EventCategory, TokenConfig};
use crate::notify::{message, Notifier};
use crate::store::Store;

/// Edge-trigger state of a fee wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeState {
    #[default]
    BelowThreshold,
    NotifiedAbove,
}

impl FeeState {
    /// Next state for an observed balance, and whether it should notify
    pub fn observe(self, balance_sol: f64, threshold_sol: f64) -> (FeeState, bool) {
        if balance_sol >= threshold_sol {
            (FeeState::NotifiedAbove, self == FeeState::BelowThreshold)
        } else {
            (FeeState::BelowThreshold, false)
        }
    }
}

/// Registry entry; at most one per user
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedToken {
    pub user_id: String,
    pub mint: String,
    pub fee_wallet: Option<String>,
    /// Newest signature already processed
    pub last_checked_signature: Option<String>,
    /// Slot of the watermark, when known
    pub last_checked_slot: Option<u64>,
    pub last_fee_balance: Option<f64>,
    pub fee_state: FeeState,
}

impl WatchedToken {
    fn new(user_id: &str, mint: &str, fee_wallet: Option<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            mint: mint.to_string(),
            fee_wallet,
            last_checked_signature: None,
            last_checked_slot: None,
            last_fee_balance: None,
            fee_state: FeeState::BelowThreshold,
        }
    }

    fn from_config(config: &TokenConfig, fee_threshold_sol: f64) -> Self {
        let fee_state = match config.last_fee_balance {
            Some(balance) if balance >= fee_threshold_sol => FeeState::NotifiedAbove,
            _ => FeeState::BelowThreshold,
        };

        Self {
            user_id: config.user_id.clone(),
            mint: config.mint.clone(),
            fee_wallet: config.fee_wallet.clone(),
            last_checked_signature: config.last_checked_signature.clone(),
            last_checked_slot: config.last_checked_slot,
            last_fee_balance: config.last_fee_balance,
            fee_state,
        }
    }
}

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSweepReport {
    pub tokens: usize,
    /// Signatures newer than the watermark
    pub new_signatures: usize,
    pub large_buys: usize,
    pub fee_crossings: usize,
    pub notified: usize,
    /// Signature pages dropped for being older than the watermark
    pub stale_pages: usize,
    /// Per-item failures (signature pages, details, balances)
    pub failures: usize,
}

pub struct TokenActivityMonitor {
    registry: DashMap<String, WatchedToken>,
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainSource>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    shutdown: broadcast::Sender<()>,
}

impl TokenActivityMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainSource>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);

        Self {
            registry: DashMap::new(),
            store,
            chain,
            notifier,
            config,
            shutdown,
        }
    }

    /// Watch `mint` for `user_id`, replacing any other token they watch
    ///
    /// Re-watching the same mint keeps its watermark. A new fee wallet
    /// restarts the fee edge trigger.
    pub fn watch(&self, user_id: &str, mint: &str, fee_wallet: Option<String>) {
        if let Some(mut entry) = self.registry.get_mut(user_id) {
            if entry.mint == mint {
                if entry.fee_wallet != fee_wallet {
                    entry.fee_wallet = fee_wallet;
                    entry.last_fee_balance = None;
                    entry.fee_state = FeeState::BelowThreshold;
                }
                return;
            }
        }

        info!(user = %user_id, mint = %mint, "Watching token");
        self.registry
            .insert(user_id.to_string(), WatchedToken::new(user_id, mint, fee_wallet));
    }

    pub fn unwatch(&self, user_id: &str) -> bool {
        let removed = self.registry.remove(user_id).is_some();
        if removed {
            info!(user = %user_id, "Stopped watching token");
        }
        removed
    }

    pub fn get(&self, user_id: &str) -> Option<WatchedToken> {
        self.registry.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn watched(&self) -> Vec<WatchedToken> {
        let mut tokens: Vec<WatchedToken> =
            self.registry.iter().map(|entry| entry.value().clone()).collect();
        tokens.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        tokens
    }

    /// Make the registry match persisted configuration
    ///
    /// Entries whose mint is unchanged keep their in-memory cursors; new
    /// or changed entries start from whatever cursors were persisted.
    pub fn reconcile(&self, configs: &[TokenConfig]) {
        let wanted: HashSet<&str> = configs.iter().map(|c| c.user_id.as_str()).collect();
        self.registry.retain(|user_id, _| wanted.contains(user_id.as_str()));

        for config in configs {
            if let Some(mut entry) = self.registry.get_mut(&config.user_id) {
                if entry.mint == config.mint {
                    if entry.fee_wallet != config.fee_wallet {
                        entry.fee_wallet = config.fee_wallet.clone();
                        entry.last_fee_balance = None;
                        entry.fee_state = FeeState::BelowThreshold;
                    }
                    continue;
                }
            }

            self.registry.insert(
                config.user_id.clone(),
                WatchedToken::from_config(config, self.config.fee_ready_threshold_sol),
            );
        }
    }

    pub async fn load_from_store(&self) -> Result<usize> {
        let configs = self.store.token_configs().await?;
        self.reconcile(&configs);
        info!("Loaded {} watched tokens", configs.len());
        Ok(configs.len())
    }

    /// Start the polling loop
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        info!(
            "Starting token activity monitor ({}s interval, {} tokens)",
            self.config.token_activity_interval_secs,
            self.registry.len()
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.token_activity_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = monitor.sweep().await;
                        debug!(
                            tokens = report.tokens,
                            new_signatures = report.new_signatures,
                            large_buys = report.large_buys,
                            fee_crossings = report.fee_crossings,
                            stale_pages = report.stale_pages,
                            failures = report.failures,
                            "Token activity sweep"
                        );
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Token activity monitor shutting down");
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

    /// One tick: transaction sweep, then fee sweep
    pub async fn sweep(&self) -> TokenSweepReport {
        if self.config.reload_from_store {
            self.reload().await;
        }

        let tokens = self.watched();
        let mut report = TokenSweepReport {
            tokens: tokens.len(),
            ..Default::default()
        };

        for token in &tokens {
            if let Err(e) = self.sweep_transactions(token, &mut report).await {
                report.failures += 1;
                log_item_failure("Signature scan", &token.mint, &e);
            }
        }

        for token in &tokens {
            let Some(fee_wallet) = token.fee_wallet.as_deref() else {
                continue;
            };
            if let Err(e) = self.sweep_fees(token, fee_wallet, &mut report).await {
                report.failures += 1;
                log_item_failure("Fee wallet check", fee_wallet, &e);
            }
        }

        if self.config.persist_cursors {
            self.persist_cursors().await;
        }

        report
    }

    async fn reload(&self) {
        if let Err(e) = self.store.refresh().await {
            warn!("Could not refresh store, using cached tokens: {}", e);
        }
        match self.store.token_configs().await {
            Ok(configs) => self.reconcile(&configs),
            Err(e) => warn!("Could not load token configs: {}", e),
        }
    }

    async fn sweep_transactions(&self, token: &WatchedToken, report: &mut TokenSweepReport) -> Result<()> {
        let limit = self.config.item_timeout();
        let page = with_timeout(
            limit,
            self.chain
                .recent_signatures(&token.mint, self.config.signature_page_size),
        )
        .await?;

        let Some(newest) = page.first() else {
            return Ok(());
        };

        let Some(watermark) = token.last_checked_signature.as_deref() else {
            debug!(mint = %token.mint, signature = %newest.signature, "Initial watermark");
            self.advance_watermark(token, newest);
            return Ok(());
        };

        if let Some(watermark_slot) = token.last_checked_slot {
            if newest.slot < watermark_slot {
                report.stale_pages += 1;
                warn!(
                    mint = %token.mint,
                    head_slot = newest.slot,
                    watermark_slot,
                    "Signature page is older than the watermark, skipping"
                );
                return Ok(());
            }
        }

        let fresh: Vec<&SignatureInfo> = if page.iter().any(|info| info.signature == watermark) {
            page.iter()
                .take_while(|info| info.signature != watermark)
                .collect()
        } else {
            debug!(mint = %token.mint, "Watermark not in page, processing newer slots");
            let floor = token.last_checked_slot;
            page.iter()
                .filter(|info| floor.map_or(true, |slot| info.slot > slot))
                .collect()
        };
        if fresh.is_empty() {
            return Ok(());
        }
        report.new_signatures += fresh.len();

        for info in fresh.iter().rev() {
            if info.failed {
                continue;
            }

            let deltas = match with_timeout(
                limit,
                self.chain.transaction_deltas(&info.signature, &token.mint),
            )
            .await
            {
                Ok(Some(deltas)) => deltas,
                Ok(None) => continue,
                Err(e) => {
                    report.failures += 1;
                    log_item_failure("Transaction fetch", &info.signature, &e);
                    continue;
                }
            };

            for delta in deltas
                .iter()
                .filter(|d| d.mint == token.mint && d.change >= self.config.large_buy_threshold)
            {
                report.large_buys += 1;
                info!(
                    mint = %token.mint,
                    buyer = %delta.owner,
                    amount = delta.change,
                    signature = %info.signature,
                    "Large buy"
                );

                let text = message::large_buy(&token.mint, &delta.owner, delta.change, &info.signature);
                if notify_user(
                    self.store.as_ref(),
                    self.notifier.as_ref(),
                    limit,
                    &token.user_id,
                    EventCategory::LargeBuy,
                    &text,
                )
                .await
                {
                    report.notified += 1;
                }
            }
        }

        self.advance_watermark(token, newest);
        Ok(())
    }

    /// Only applies if the user still watches the same mint, and never to an older slot
    fn advance_watermark(&self, token: &WatchedToken, newest: &SignatureInfo) {
        if let Some(mut entry) = self.registry.get_mut(&token.user_id) {
            if entry.mint != token.mint {
                return;
            }
            if entry.last_checked_slot.is_some_and(|slot| newest.slot < slot) {
                return;
            }
            entry.last_checked_signature = Some(newest.signature.clone());
            entry.last_checked_slot = Some(newest.slot);
        }
    }

    async fn sweep_fees(
        &self,
        token: &WatchedToken,
        fee_wallet: &str,
        report: &mut TokenSweepReport,
    ) -> Result<()> {
        let limit = self.config.item_timeout();
        let threshold = self.config.fee_ready_threshold_sol;
        let balance = with_timeout(limit, self.chain.balance_sol(fee_wallet)).await?;

        let crossed = match self.registry.get_mut(&token.user_id) {
            Some(mut entry)
                if entry.mint == token.mint && entry.fee_wallet.as_deref() == Some(fee_wallet) =>
            {
                let (next, crossed) = entry.fee_state.observe(balance, threshold);
                entry.fee_state = next;
                entry.last_fee_balance = Some(balance);
                crossed
            }
            _ => return Ok(()),
        };

        if !crossed {
            return Ok(());
        }

        report.fee_crossings += 1;
        info!(mint = %token.mint, fee_wallet = %fee_wallet, balance, "Fee wallet ready");

        let text = message::fee_ready(&token.mint, fee_wallet, balance, threshold);
        if notify_user(
            self.store.as_ref(),
            self.notifier.as_ref(),
            limit,
            &token.user_id,
            EventCategory::FeeReady,
            &text,
        )
        .await
        {
            report.notified += 1;
        }

        Ok(())
    }

    async fn persist_cursors(&self) {
        for token in self.watched() {
            if let Err(e) = self
                .store
                .save_token_cursor(
                    &token.user_id,
                    &token.mint,
                    token.last_checked_signature.clone(),
                    token.last_checked_slot,
                    token.last_fee_balance,
                )
                .await
            {
                warn!(user = %token.user_id, "Could not persist cursor: {}", e);
            }
        }
    }
}
