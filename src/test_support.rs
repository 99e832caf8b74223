//! In-memory collaborators for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::chain::{BalanceDelta, ChainSource, HolderBalance, MintInfo, SignatureInfo};
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::price::PriceOracle;

/// Price oracle with fixed answers
#[derive(Default)]
pub struct MockOracle {
    prices: Mutex<HashMap<String, f64>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, token: &str, price: f64) -> Self {
        self.set_price(token, price);
        self
    }

    pub fn failing(mut self, token: &str) -> Self {
        self.failing.insert(token.to_string());
        self
    }

    pub fn set_price(&self, token: &str, price: f64) {
        self.prices.lock().unwrap().insert(token.to_string(), price);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceOracle for MockOracle {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn price(&self, token_address: &str) -> Result<Option<f64>> {
        self.calls.lock().unwrap().push(token_address.to_string());
        if self.failing.contains(token_address) {
            return Err(Error::Price(format!("no route for {}", token_address)));
        }
        Ok(self.prices.lock().unwrap().get(token_address).copied())
    }
}

fn slot_of(signature: &str) -> u64 {
    let digits: String = signature
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}

/// Chain with scripted responses
///
/// Signature pages and balances are queues: each call consumes the next
/// entry. An exhausted signature queue yields an empty page; an exhausted
/// balance queue is an RPC error.
#[derive(Default)]
pub struct MockChain {
    pages: Mutex<HashMap<String, VecDeque<Vec<SignatureInfo>>>>,
    details: Mutex<HashMap<String, Option<Vec<BalanceDelta>>>>,
    failing_details: Mutex<HashSet<String>>,
    balances: Mutex<HashMap<String, VecDeque<f64>>>,
    failing_addresses: Mutex<HashSet<String>>,
    hanging_addresses: Mutex<HashSet<String>>,
    mints: Mutex<HashMap<String, MintInfo>>,
    holders: Mutex<HashMap<String, Vec<HolderBalance>>>,
    detail_calls: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page of signatures (newest first)
    ///
    /// Each signature lands in the slot named by its trailing digits, so
    /// `s5` is newer than `s4`.
    pub fn push_page(&self, address: &str, signatures: &[&str]) {
        self.pages
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push_back(
                signatures
                    .iter()
                    .map(|s| SignatureInfo::ok(*s, slot_of(s)))
                    .collect(),
            );
    }

    pub fn push_page_infos(&self, address: &str, infos: Vec<SignatureInfo>) {
        self.pages
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push_back(infos);
    }

    pub fn set_detail(&self, signature: &str, deltas: Vec<BalanceDelta>) {
        self.details
            .lock()
            .unwrap()
            .insert(signature.to_string(), Some(deltas));
    }

    pub fn fail_detail(&self, signature: &str) {
        self.failing_details
            .lock()
            .unwrap()
            .insert(signature.to_string());
    }

    pub fn push_balances(&self, address: &str, balances: &[f64]) {
        self.balances
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .extend(balances.iter().copied());
    }

    pub fn fail_address(&self, address: &str) {
        self.failing_addresses
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub fn hang_address(&self, address: &str) {
        self.hanging_addresses
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub fn set_mint(&self, mint: &str, info: MintInfo) {
        self.mints.lock().unwrap().insert(mint.to_string(), info);
    }

    pub fn set_holders(&self, mint: &str, holders: Vec<HolderBalance>) {
        self.holders.lock().unwrap().insert(mint.to_string(), holders);
    }

    /// Signatures whose details were requested, in order
    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }

    async fn gate(&self, address: &str) -> Result<()> {
        let hanging = self.hanging_addresses.lock().unwrap().contains(address);
        if hanging {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.failing_addresses.lock().unwrap().contains(address) {
            return Err(Error::Rpc(format!("connection refused for {}", address)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn recent_signatures(&self, address: &str, limit: usize) -> Result<Vec<SignatureInfo>> {
        self.gate(address).await?;
        let page = self
            .pages
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(|q| q.pop_front())
            .unwrap_or_default();
        Ok(page.into_iter().take(limit).collect())
    }

    async fn transaction_deltas(&self, signature: &str, _mint: &str) -> Result<Option<Vec<BalanceDelta>>> {
        self.detail_calls.lock().unwrap().push(signature.to_string());
        if self.failing_details.lock().unwrap().contains(signature) {
            return Err(Error::Rpc(format!("transaction {} not available", signature)));
        }
        Ok(self
            .details
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .unwrap_or_else(|| Some(Vec::new())))
    }

    async fn balance_sol(&self, address: &str) -> Result<f64> {
        self.gate(address).await?;
        self.balances
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| Error::Rpc(format!("no balance scripted for {}", address)))
    }

    async fn mint_info(&self, mint: &str) -> Result<MintInfo> {
        self.gate(mint).await?;
        self.mints
            .lock()
            .unwrap()
            .get(mint)
            .cloned()
            .ok_or_else(|| Error::InvalidMint(format!("{} is not a mint", mint)))
    }

    async fn largest_holders(&self, mint: &str) -> Result<Vec<HolderBalance>> {
        self.gate(mint).await?;
        Ok(self.holders.lock().unwrap().get(mint).cloned().unwrap_or_default())
    }
}

/// Notifier that records what it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records attempts but reports every send as failed
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), message.to_string()));
        if self.fail {
            return Err(Error::Notify("Bad Request: chat not found".into()));
        }
        Ok(())
    }
}
