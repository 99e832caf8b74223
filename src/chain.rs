//! Solana chain access
//!
//! Everything the monitors and the risk checker read from the chain goes
//! through `ChainSource`. Addresses and signatures cross this boundary as
//! base58 strings; parsing happens in the RPC implementation.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::native_token::lamports_to_sol;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{UiTransactionEncoding, UiTransactionTokenBalance};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// One entry of an address's signature history
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureInfo {
    pub signature: String,
    /// Slot the transaction landed in
    pub slot: u64,
    /// The transaction landed but failed
    pub failed: bool,
}

impl SignatureInfo {
    pub fn ok(signature: impl Into<String>, slot: u64) -> Self {
        Self {
            signature: signature.into(),
            slot,
            failed: false,
        }
    }
}

/// Change of one account's token balance within a transaction, in UI units
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceDelta {
    pub owner: String,
    pub mint: String,
    pub change: f64,
}

/// Token balance of one account before or after a transaction
#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub account_index: u8,
    pub mint: String,
    pub owner: Option<String>,
    pub amount: f64,
}

impl From<UiTransactionTokenBalance> for TokenBalance {
    fn from(b: UiTransactionTokenBalance) -> Self {
        let amount = b
            .ui_token_amount
            .ui_amount_string
            .parse::<f64>()
            .ok()
            .or(b.ui_token_amount.ui_amount)
            .unwrap_or(0.0);

        Self {
            account_index: b.account_index,
            mint: b.mint,
            owner: Option::from(b.owner),
            amount,
        }
    }
}

/// Per-account deltas of `mint` between pre and post balances
///
/// Accounts missing on one side count as zero there (created or closed
/// within the transaction). Zero deltas are dropped.
pub fn token_balance_deltas(pre: &[TokenBalance], post: &[TokenBalance], mint: &str) -> Vec<BalanceDelta> {
    let mut by_account: BTreeMap<u8, (f64, f64, Option<String>)> = BTreeMap::new();

    for b in pre.iter().filter(|b| b.mint == mint) {
        let entry = by_account.entry(b.account_index).or_insert((0.0, 0.0, None));
        entry.0 = b.amount;
        entry.2 = entry.2.take().or_else(|| b.owner.clone());
    }
    for b in post.iter().filter(|b| b.mint == mint) {
        let entry = by_account.entry(b.account_index).or_insert((0.0, 0.0, None));
        entry.1 = b.amount;
        if b.owner.is_some() {
            entry.2 = b.owner.clone();
        }
    }

    by_account
        .into_iter()
        .filter_map(|(index, (before, after, owner))| {
            let change = after - before;
            (change != 0.0).then(|| BalanceDelta {
                owner: owner.unwrap_or_else(|| format!("account#{}", index)),
                mint: mint.to_string(),
                change,
            })
        })
        .collect()
}

/// Decoded SPL mint account
#[derive(Debug, Clone, PartialEq)]
pub struct MintInfo {
    pub supply: u64,
    pub decimals: u8,
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
}

impl MintInfo {
    /// Supply in UI units
    pub fn ui_supply(&self) -> f64 {
        self.supply as f64 / 10f64.powi(self.decimals as i32)
    }

    /// Decode the base mint layout (also the prefix of Token-2022 mints)
    pub fn decode(data: &[u8]) -> Result<Self> {
        let len = spl_token::state::Mint::LEN;
        if data.len() < len {
            return Err(Error::InvalidMint(format!(
                "account data is {} bytes, expected at least {}",
                data.len(),
                len
            )));
        }

        let mint = spl_token::state::Mint::unpack_from_slice(&data[..len])
            .map_err(|e| Error::InvalidMint(e.to_string()))?;
        if !mint.is_initialized {
            return Err(Error::InvalidMint("mint is not initialized".into()));
        }

        let mint_authority: Option<Pubkey> = mint.mint_authority.into();
        let freeze_authority: Option<Pubkey> = mint.freeze_authority.into();

        Ok(Self {
            supply: mint.supply,
            decimals: mint.decimals,
            mint_authority: mint_authority.map(|k| k.to_string()),
            freeze_authority: freeze_authority.map(|k| k.to_string()),
        })
    }
}

/// A token account and its balance in UI units
#[derive(Debug, Clone, PartialEq)]
pub struct HolderBalance {
    pub address: String,
    pub amount: f64,
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Most recent signatures for `address`, newest first
    async fn recent_signatures(&self, address: &str, limit: usize) -> Result<Vec<SignatureInfo>>;

    /// Balance changes of `mint` in a transaction; `None` if the
    /// transaction has no status metadata
    async fn transaction_deltas(&self, signature: &str, mint: &str) -> Result<Option<Vec<BalanceDelta>>>;

    /// Native balance in SOL
    async fn balance_sol(&self, address: &str) -> Result<f64>;

    async fn mint_info(&self, mint: &str) -> Result<MintInfo>;

    /// Largest token accounts of a mint, largest first
    async fn largest_holders(&self, mint: &str) -> Result<Vec<HolderBalance>>;
}

pub(crate) fn parse_pubkey(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address.trim())
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))
}

fn parse_signature(signature: &str) -> Result<Signature> {
    Signature::from_str(signature.trim())
        .map_err(|e| Error::InvalidSignature(format!("{}: {}", signature, e)))
}

/// `ChainSource` over Solana JSON-RPC
pub struct SolanaChain {
    rpc: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaChain {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout(endpoint.into(), timeout),
            commitment: CommitmentConfig::confirmed(),
        }
    }

    /// Current slot, used as a health check
    pub async fn slot(&self) -> Result<u64> {
        Ok(self.rpc.get_slot_with_commitment(self.commitment).await?)
    }
}

#[async_trait]
impl ChainSource for SolanaChain {
    async fn recent_signatures(&self, address: &str, limit: usize) -> Result<Vec<SignatureInfo>> {
        let pubkey = parse_pubkey(address)?;
        let config = GetConfirmedSignaturesForAddress2Config {
            limit: Some(limit),
            commitment: Some(self.commitment),
            ..Default::default()
        };

        let statuses = self
            .rpc
            .get_signatures_for_address_with_config(&pubkey, config)
            .await?;

        Ok(statuses
            .into_iter()
            .map(|s| SignatureInfo {
                signature: s.signature,
                slot: s.slot,
                failed: s.err.is_some(),
            })
            .collect())
    }

    async fn transaction_deltas(&self, signature: &str, mint: &str) -> Result<Option<Vec<BalanceDelta>>> {
        let sig = parse_signature(signature)?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        let tx = self.rpc.get_transaction_with_config(&sig, config).await?;
        let Some(meta) = tx.transaction.meta else {
            debug!(signature = %signature, "Transaction has no status meta");
            return Ok(None);
        };

        let pre: Vec<TokenBalance> = Option::<Vec<UiTransactionTokenBalance>>::from(meta.pre_token_balances)
            .unwrap_or_default()
            .into_iter()
            .map(TokenBalance::from)
            .collect();
        let post: Vec<TokenBalance> = Option::<Vec<UiTransactionTokenBalance>>::from(meta.post_token_balances)
            .unwrap_or_default()
            .into_iter()
            .map(TokenBalance::from)
            .collect();

        Ok(Some(token_balance_deltas(&pre, &post, mint)))
    }

    async fn balance_sol(&self, address: &str) -> Result<f64> {
        let pubkey = parse_pubkey(address)?;
        let lamports = self
            .rpc
            .get_balance_with_commitment(&pubkey, self.commitment)
            .await?
            .value;
        Ok(lamports_to_sol(lamports))
    }

    async fn mint_info(&self, mint: &str) -> Result<MintInfo> {
        let pubkey = parse_pubkey(mint)?;
        let account = self.rpc.get_account(&pubkey).await?;
        MintInfo::decode(&account.data)
    }

    async fn largest_holders(&self, mint: &str) -> Result<Vec<HolderBalance>> {
        let pubkey = parse_pubkey(mint)?;
        let accounts = self.rpc.get_token_largest_accounts(&pubkey).await?;

        Ok(accounts
            .into_iter()
            .map(|a| HolderBalance {
                amount: a
                    .amount
                    .ui_amount_string
                    .parse::<f64>()
                    .ok()
                    .or(a.amount.ui_amount)
                    .unwrap_or(0.0),
                address: a.address,
            })
            .collect())
    }
}
