//! JSON file store
//!
//! Keeps a cached copy of the document in memory for reads. Every mutation
//! is a read-modify-write against the file itself, done while holding an
//! exclusive lock on a `.lock` file next to it, so the service and the CLI
//! can edit the same store without overwriting each other. Writes go to a
//! temp file first and are renamed into place.

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::Store;
use crate::error::{Error, Result};
use crate::models::{ChannelConfig, NewAlert, TokenConfig, WatchedAlert};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    alerts: Vec<WatchedAlert>,
    #[serde(default)]
    tokens: Vec<TokenConfig>,
    #[serde(default)]
    channels: Vec<ChannelConfig>,
}

pub struct JsonStore {
    data: RwLock<StoreData>,
    persistence_path: Option<PathBuf>,
}

impl JsonStore {
    /// Open (or lazily create) a store backed by `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self {
            data: RwLock::new(StoreData::default()),
            persistence_path: Some(path.as_ref().to_path_buf()),
        };
        store.load().await?;
        Ok(store)
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(StoreData::default()),
            persistence_path: None,
        }
    }

    async fn load(&self) -> Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        if !path.exists() {
            debug!("Store file {} does not exist yet", path.display());
            return Ok(());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Store(format!("read {}: {}", path.display(), e)))?;
        let data = parse_document(&raw, path)?;

        debug!(
            alerts = data.alerts.len(),
            tokens = data.tokens.len(),
            channels = data.channels.len(),
            "Loaded store from {}",
            path.display()
        );

        *self.data.write().await = data;
        Ok(())
    }

    /// Apply `change` to the latest document and persist it if it changed
    ///
    /// `change` reports whether it modified the document. The cached copy
    /// is replaced with what is on disk afterwards, including edits made by
    /// other processes.
    async fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut StoreData) -> Result<(T, bool)> + Send + 'static,
        T: Send + 'static,
    {
        let mut cached = self.data.write().await;

        let Some(path) = self.persistence_path.clone() else {
            let (out, _) = change(&mut *cached)?;
            return Ok(out);
        };

        let (out, latest) = tokio::task::spawn_blocking(move || locked_update(&path, change))
            .await
            .map_err(|e| Error::Store(format!("store writer task failed: {}", e)))??;

        *cached = latest;
        Ok(out)
    }
}

fn parse_document(raw: &str, path: &Path) -> Result<StoreData> {
    if raw.trim().is_empty() {
        return Ok(StoreData::default());
    }
    serde_json::from_str(raw).map_err(|e| Error::Store(format!("parse {}: {}", path.display(), e)))
}

/// `store.json` -> `store.json<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Blocking read-modify-write under the store's exclusive file lock
fn locked_update<T, F>(path: &Path, change: F) -> Result<(T, StoreData)>
where
    F: FnOnce(&mut StoreData) -> Result<(T, bool)>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Store(format!("create {}: {}", parent.display(), e)))?;
        }
    }

    let lock_path = sibling(path, ".lock");
    let lock: File = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| Error::Store(format!("open {}: {}", lock_path.display(), e)))?;
    lock.lock_exclusive()
        .map_err(|e| Error::Store(format!("lock {}: {}", lock_path.display(), e)))?;

    let mut data = match std::fs::read_to_string(path) {
        Ok(raw) => parse_document(&raw, path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
        Err(e) => return Err(Error::Store(format!("read {}: {}", path.display(), e))),
    };

    let (out, changed) = change(&mut data)?;

    if changed {
        let body = serde_json::to_string_pretty(&data)?;
        let tmp = sibling(path, ".tmp");
        std::fs::write(&tmp, body)
            .map_err(|e| Error::Store(format!("write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| Error::Store(format!("rename into {}: {}", path.display(), e)))?;
    }

    // Released when `lock` is closed
    drop(lock);
    Ok((out, data))
}

#[async_trait]
impl Store for JsonStore {
    async fn refresh(&self) -> Result<()> {
        self.load().await
    }

    async fn active_alerts(&self) -> Result<Vec<WatchedAlert>> {
        let data = self.data.read().await;
        Ok(data.alerts.iter().filter(|a| a.is_pending()).cloned().collect())
    }

    async fn alerts(&self, user_id: Option<&str>) -> Result<Vec<WatchedAlert>> {
        let data = self.data.read().await;
        Ok(data
            .alerts
            .iter()
            .filter(|a| user_id.map_or(true, |u| a.user_id == u))
            .cloned()
            .collect())
    }

    async fn insert_alert(&self, alert: NewAlert) -> Result<WatchedAlert> {
        let alert = alert.into_alert();
        let stored = alert.clone();
        self.mutate(move |data| {
            data.alerts.push(stored);
            Ok(((), true))
        })
        .await?;

        info!(
            alert_id = %alert.id,
            user = %alert.user_id,
            symbol = %alert.token_symbol,
            "Created price alert"
        );
        Ok(alert)
    }

    async fn delete_alert(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.mutate(move |data| {
            let before = data.alerts.len();
            data.alerts.retain(|a| a.id != id);
            let removed = data.alerts.len() != before;
            Ok((removed, removed))
        })
        .await
    }

    async fn mark_alert_triggered(&self, id: &str, price: f64) -> Result<bool> {
        let id = id.to_string();
        self.mutate(move |data| {
            let alert = data
                .alerts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| Error::NotFound(format!("alert {}", id)))?;

            if alert.is_triggered {
                return Ok((false, false));
            }

            alert.is_triggered = true;
            alert.triggered_at = Some(Utc::now());
            alert.triggered_price = Some(price);
            Ok((true, true))
        })
        .await
    }

    async fn token_configs(&self) -> Result<Vec<TokenConfig>> {
        Ok(self.data.read().await.tokens.clone())
    }

    async fn upsert_token_config(&self, config: TokenConfig) -> Result<()> {
        self.mutate(move |data| {
            match data.tokens.iter_mut().find(|t| t.user_id == config.user_id) {
                Some(existing) => *existing = config,
                None => data.tokens.push(config),
            }
            Ok(((), true))
        })
        .await
    }

    async fn remove_token_config(&self, user_id: &str) -> Result<bool> {
        let user_id = user_id.to_string();
        self.mutate(move |data| {
            let before = data.tokens.len();
            data.tokens.retain(|t| t.user_id != user_id);
            let removed = data.tokens.len() != before;
            Ok((removed, removed))
        })
        .await
    }

    async fn save_token_cursor(
        &self,
        user_id: &str,
        mint: &str,
        last_checked_signature: Option<String>,
        last_checked_slot: Option<u64>,
        last_fee_balance: Option<f64>,
    ) -> Result<()> {
        let user_id = user_id.to_string();
        let mint = mint.to_string();
        self.mutate(move |data| {
            let Some(token) = data
                .tokens
                .iter_mut()
                .find(|t| t.user_id == user_id && t.mint == mint)
            else {
                return Ok(((), false));
            };

            if token.last_checked_signature == last_checked_signature
                && token.last_checked_slot == last_checked_slot
                && token.last_fee_balance == last_fee_balance
            {
                return Ok(((), false));
            }

            token.last_checked_signature = last_checked_signature;
            token.last_checked_slot = last_checked_slot;
            token.last_fee_balance = last_fee_balance;
            Ok(((), true))
        })
        .await
    }

    async fn channel(&self, user_id: &str) -> Result<Option<ChannelConfig>> {
        let data = self.data.read().await;
        Ok(data.channels.iter().find(|c| c.user_id == user_id).cloned())
    }

    async fn channels(&self) -> Result<Vec<ChannelConfig>> {
        Ok(self.data.read().await.channels.clone())
    }

    async fn upsert_channel(&self, channel: ChannelConfig) -> Result<()> {
        self.mutate(move |data| {
            match data.channels.iter_mut().find(|c| c.user_id == channel.user_id) {
                Some(existing) => *existing = channel,
                None => data.channels.push(channel),
            }
            Ok(((), true))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertDirection;
    use tokio_test::assert_ok;

    fn bonk_alert() -> NewAlert {
        NewAlert {
            user_id: "user-1".into(),
            token_address: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263".into(),
            token_symbol: "BONK".into(),
            target_price: 0.00002,
            direction: AlertDirection::Above,
        }
    }

    #[tokio::test]
    async fn test_trigger_is_single_transition() {
        let store = JsonStore::in_memory();
        let alert = store.insert_alert(bonk_alert()).await.unwrap();

        assert!(store.mark_alert_triggered(&alert.id, 0.0000205).await.unwrap());
        assert!(!store.mark_alert_triggered(&alert.id, 0.000021).await.unwrap());

        let stored = &store.alerts(None).await.unwrap()[0];
        assert!(stored.is_triggered);
        assert_eq!(stored.triggered_price, Some(0.0000205));
        assert!(store.active_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_unknown_alert_is_not_found() {
        let store = JsonStore::in_memory();
        let err = store.mark_alert_triggered("missing", 1.0).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonStore::open(&path).await.unwrap();
        let alert = store.insert_alert(bonk_alert()).await.unwrap();
        assert_ok!(
            store
                .upsert_token_config(TokenConfig::new("user-1", "mint-a", Some("fee-a".into())))
                .await
        );
        assert_ok!(store.upsert_channel(ChannelConfig::new("user-1", "42")).await);
        drop(store);

        let reopened = JsonStore::open(&path).await.unwrap();
        let alerts = reopened.alerts(Some("user-1")).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, alert.id);
        assert_eq!(reopened.token_configs().await.unwrap()[0].fee_wallet.as_deref(), Some("fee-a"));
        assert_eq!(reopened.channel("user-1").await.unwrap().unwrap().chat_id, "42");
    }

    #[tokio::test]
    async fn test_refresh_sees_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let monitor_view = JsonStore::open(&path).await.unwrap();
        let cli_view = JsonStore::open(&path).await.unwrap();

        cli_view
            .upsert_token_config(TokenConfig::new("user-2", "mint-b", None))
            .await
            .unwrap();
        assert!(monitor_view.token_configs().await.unwrap().is_empty());

        assert_ok!(monitor_view.refresh().await);
        assert_eq!(monitor_view.token_configs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_token_replaces_per_user() {
        let store = JsonStore::in_memory();
        store
            .upsert_token_config(TokenConfig::new("user-1", "mint-a", None))
            .await
            .unwrap();
        store
            .upsert_token_config(TokenConfig::new("user-1", "mint-b", Some("fee".into())))
            .await
            .unwrap();

        let tokens = store.token_configs().await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].mint, "mint-b");

        assert!(store.remove_token_config("user-1").await.unwrap());
        assert!(!store.remove_token_config("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cursor_ignored_for_stale_mint() {
        let store = JsonStore::in_memory();
        store
            .upsert_token_config(TokenConfig::new("user-1", "mint-b", None))
            .await
            .unwrap();

        store
            .save_token_cursor("user-1", "mint-a", Some("sig".into()), Some(7), Some(0.5))
            .await
            .unwrap();
        assert_eq!(store.token_configs().await.unwrap()[0].last_checked_signature, None);

        store
            .save_token_cursor("user-1", "mint-b", Some("sig".into()), Some(7), Some(0.5))
            .await
            .unwrap();
        let token = &store.token_configs().await.unwrap()[0];
        assert_eq!(token.last_checked_signature.as_deref(), Some("sig"));
        assert_eq!(token.last_checked_slot, Some(7));
        assert_eq!(token.last_fee_balance, Some(0.5));
    }

    #[tokio::test]
    async fn test_stale_handle_keeps_other_writers_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let service = JsonStore::open(&path).await.unwrap();
        let cli = JsonStore::open(&path).await.unwrap();

        let mut other = bonk_alert();
        other.user_id = "user-2".into();
        let first = service.insert_alert(bonk_alert()).await.unwrap();
        let second = cli.insert_alert(other).await.unwrap();

        // The later writer also picks up the earlier one's record
        assert_eq!(cli.alerts(None).await.unwrap().len(), 2);

        let reopened = JsonStore::open(&path).await.unwrap();
        let ids: Vec<String> = reopened.alerts(None).await.unwrap().into_iter().map(|a| a.id).collect();
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
    }

    #[tokio::test]
    async fn test_trigger_survives_write_from_stale_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let service = JsonStore::open(&path).await.unwrap();
        let alert = service.insert_alert(bonk_alert()).await.unwrap();

        // Opened before the trigger, so its cached copy still shows the alert pending
        let cli = JsonStore::open(&path).await.unwrap();
        assert!(service.mark_alert_triggered(&alert.id, 0.0000205).await.unwrap());

        assert_ok!(cli.upsert_channel(ChannelConfig::new("user-1", "42")).await);
        assert!(!cli.mark_alert_triggered(&alert.id, 0.00003).await.unwrap());

        let reopened = JsonStore::open(&path).await.unwrap();
        let stored = &reopened.alerts(None).await.unwrap()[0];
        assert!(stored.is_triggered);
        assert_eq!(stored.triggered_price, Some(0.0000205));
        assert!(reopened.channel("user-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_writers_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let a = std::sync::Arc::new(JsonStore::open(&path).await.unwrap());
        let b = std::sync::Arc::new(JsonStore::open(&path).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..10 {
            let store = if i % 2 == 0 { a.clone() } else { b.clone() };
            tasks.push(tokio::spawn(async move {
                store
                    .upsert_token_config(TokenConfig::new(format!("user-{}", i), "mint-a", None))
                    .await
            }));
        }
        for task in tasks {
            assert_ok!(task.await.unwrap());
        }

        let reopened = JsonStore::open(&path).await.unwrap();
        assert_eq!(reopened.token_configs().await.unwrap().len(), 10);
    }
}
