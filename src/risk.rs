//! Token Risk Checker
//!
//! One-shot rug-pull heuristics for a mint: live authorities, holder
//! concentration and DEX liquidity, folded into a 0-100 score.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::{ChainSource, HolderBalance, MintInfo};
use crate::dexscreener::DexScreenerClient;
use crate::error::Result;

const MINT_AUTHORITY_POINTS: u8 = 35;
const FREEZE_AUTHORITY_POINTS: u8 = 25;
const TOP_HOLDER_POINTS: u8 = 20;
const DOMINANT_HOLDER_POINTS: u8 = 30;
const TOP10_POINTS: u8 = 10;
const LOW_LIQUIDITY_POINTS: u8 = 10;

const TOP_HOLDER_PCT: f64 = 20.0;
const DOMINANT_HOLDER_PCT: f64 = 50.0;
const TOP10_PCT: f64 = 50.0;
const MIN_LIQUIDITY_USD: f64 = 5_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => RiskLevel::Low,
            30..=59 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// A single contribution to the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RiskFlag {
    MintAuthorityActive { authority: String },
    FreezeAuthorityActive { authority: String },
    ConcentratedTopHolder { pct: f64 },
    DominantTopHolder { pct: f64 },
    ConcentratedTop10 { pct: f64 },
    LowLiquidity { usd: f64 },
    NoLiquidityPair,
}

impl RiskFlag {
    pub fn points(&self) -> u8 {
        match self {
            RiskFlag::MintAuthorityActive { .. } => MINT_AUTHORITY_POINTS,
            RiskFlag::FreezeAuthorityActive { .. } => FREEZE_AUTHORITY_POINTS,
            RiskFlag::ConcentratedTopHolder { .. } => TOP_HOLDER_POINTS,
            RiskFlag::DominantTopHolder { .. } => DOMINANT_HOLDER_POINTS,
            RiskFlag::ConcentratedTop10 { .. } => TOP10_POINTS,
            RiskFlag::LowLiquidity { .. } | RiskFlag::NoLiquidityPair => LOW_LIQUIDITY_POINTS,
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFlag::MintAuthorityActive { authority } => {
                write!(f, "Mint authority active ({})", authority)
            }
            RiskFlag::FreezeAuthorityActive { authority } => {
                write!(f, "Freeze authority active ({})", authority)
            }
            RiskFlag::ConcentratedTopHolder { pct } => write!(f, "Top holder owns {:.1}%", pct),
            RiskFlag::DominantTopHolder { pct } => write!(f, "Top holder owns {:.1}% (majority)", pct),
            RiskFlag::ConcentratedTop10 { pct } => write!(f, "Top 10 holders own {:.1}%", pct),
            RiskFlag::LowLiquidity { usd } => write!(f, "Low liquidity (${:.0})", usd),
            RiskFlag::NoLiquidityPair => write!(f, "No DEX pair found"),
        }
    }
}

/// Liquidity lookup result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Liquidity {
    /// Lookup disabled or failed
    Unknown,
    NoPair,
    Usd(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub mint: String,
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
    /// UI units
    pub supply: f64,
    pub decimals: u8,
    pub top_holder_pct: f64,
    pub top10_pct: f64,
    pub liquidity_usd: Option<f64>,
    pub score: u8,
    pub level: RiskLevel,
    pub flags: Vec<RiskFlag>,
}

impl RiskReport {
    /// Score already-fetched data
    pub fn assess(mint: &str, info: &MintInfo, holders: &[HolderBalance], liquidity: Liquidity) -> Self {
        let supply = info.ui_supply();
        let share = |amount: f64| {
            if supply > 0.0 {
                (amount / supply * 100.0).min(100.0)
            } else {
                0.0
            }
        };

        let mut amounts: Vec<f64> = holders.iter().map(|h| h.amount).collect();
        amounts.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let top_holder_pct = amounts.first().map(|a| share(*a)).unwrap_or(0.0);
        let top10_pct = share(amounts.iter().take(10).sum());

        let mut flags = Vec::new();
        if let Some(authority) = &info.mint_authority {
            flags.push(RiskFlag::MintAuthorityActive {
                authority: authority.clone(),
            });
        }
        if let Some(authority) = &info.freeze_authority {
            flags.push(RiskFlag::FreezeAuthorityActive {
                authority: authority.clone(),
            });
        }
        if top_holder_pct > DOMINANT_HOLDER_PCT {
            flags.push(RiskFlag::DominantTopHolder { pct: top_holder_pct });
        } else if top_holder_pct > TOP_HOLDER_PCT {
            flags.push(RiskFlag::ConcentratedTopHolder { pct: top_holder_pct });
        }
        if top10_pct > TOP10_PCT {
            flags.push(RiskFlag::ConcentratedTop10 { pct: top10_pct });
        }
        match liquidity {
            Liquidity::Usd(usd) if usd < MIN_LIQUIDITY_USD => {
                flags.push(RiskFlag::LowLiquidity { usd })
            }
            Liquidity::NoPair => flags.push(RiskFlag::NoLiquidityPair),
            _ => {}
        }

        let score = flags
            .iter()
            .map(|f| f.points() as u32)
            .sum::<u32>()
            .min(100) as u8;

        Self {
            mint: mint.to_string(),
            mint_authority: info.mint_authority.clone(),
            freeze_authority: info.freeze_authority.clone(),
            supply,
            decimals: info.decimals,
            top_holder_pct,
            top10_pct,
            liquidity_usd: match liquidity {
                Liquidity::Usd(usd) => Some(usd),
                _ => None,
            },
            score,
            level: RiskLevel::from_score(score),
            flags,
        }
    }

    pub fn summary(&self) -> String {
        if self.flags.is_empty() {
            return format!("{} risk ({}/100): no issues found", self.level, self.score);
        }

        let issues: Vec<String> = self.flags.iter().map(|f| f.to_string()).collect();
        format!("{} risk ({}/100): {}", self.level, self.score, issues.join(", "))
    }
}

pub struct RiskChecker {
    chain: Arc<dyn ChainSource>,
    dexscreener: Option<DexScreenerClient>,
}

impl RiskChecker {
    pub fn new(chain: Arc<dyn ChainSource>, dexscreener: Option<DexScreenerClient>) -> Self {
        Self { chain, dexscreener }
    }

    pub async fn check(&self, mint: &str) -> Result<RiskReport> {
        let info = self.chain.mint_info(mint).await?;

        // Concentration is best-effort; a mint with no readable holders still scores
        let holders = match self.chain.largest_holders(mint).await {
            Ok(holders) => holders,
            Err(e) => {
                warn!(mint = %mint, "Could not fetch largest holders: {}", e);
                Vec::new()
            }
        };

        let liquidity = match &self.dexscreener {
            None => Liquidity::Unknown,
            Some(client) => match client.liquidity_usd(mint).await {
                Ok(Some(usd)) => Liquidity::Usd(usd),
                Ok(None) => Liquidity::NoPair,
                Err(e) => {
                    debug!(mint = %mint, "Liquidity lookup failed: {}", e);
                    Liquidity::Unknown
                }
            },
        };

        Ok(RiskReport::assess(mint, &info, &holders, liquidity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockChain;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";
    const AUTHORITY: &str = "TSLvdd1pWpHVjahSpsvCXUbgwsL3JAcvokwaKt1eokM";

    fn mint_info(mint_authority: bool, freeze_authority: bool) -> MintInfo {
        MintInfo {
            supply: 1_000_000_000_000_000,
            decimals: 6,
            mint_authority: mint_authority.then(|| AUTHORITY.to_string()),
            freeze_authority: freeze_authority.then(|| AUTHORITY.to_string()),
        }
    }

    fn holders(amounts: &[f64]) -> Vec<HolderBalance> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| HolderBalance {
                address: format!("holder{}", i),
                amount: *amount,
            })
            .collect()
    }

    #[test]
    fn test_levels() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
    }

    #[test]
    fn test_clean_token() {
        let report = RiskReport::assess(
            MINT,
            &mint_info(false, false),
            &holders(&[50_000_000.0, 40_000_000.0]),
            Liquidity::Usd(80_000.0),
        );

        assert_eq!(report.score, 0);
        assert_eq!(report.level, RiskLevel::Low);
        assert!(report.flags.is_empty());
        assert!((report.top_holder_pct - 5.0).abs() < 1e-9);
        assert!((report.top10_pct - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_authorities_score() {
        let report = RiskReport::assess(MINT, &mint_info(true, true), &[], Liquidity::Unknown);
        assert_eq!(report.score, 60);
        assert_eq!(report.level, RiskLevel::High);
        assert_eq!(report.flags.len(), 2);
    }

    #[test]
    fn test_dominant_holder_replaces_concentrated() {
        let report = RiskReport::assess(
            MINT,
            &mint_info(false, false),
            &holders(&[600_000_000.0]),
            Liquidity::Unknown,
        );

        assert_eq!(report.flags.len(), 2);
        assert!(matches!(report.flags[0], RiskFlag::DominantTopHolder { pct } if (pct - 60.0).abs() < 1e-9));
        assert!(matches!(report.flags[1], RiskFlag::ConcentratedTop10 { .. }));
        assert_eq!(report.score, 40);
    }

    #[test]
    fn test_score_is_capped() {
        let report = RiskReport::assess(
            MINT,
            &mint_info(true, true),
            &holders(&[900_000_000.0]),
            Liquidity::NoPair,
        );
        assert_eq!(report.score, 100);
        assert!(report.summary().starts_with("HIGH risk (100/100)"));
    }

    #[test]
    fn test_unknown_liquidity_is_not_penalised() {
        let unknown = RiskReport::assess(MINT, &mint_info(false, false), &[], Liquidity::Unknown);
        let thin = RiskReport::assess(MINT, &mint_info(false, false), &[], Liquidity::Usd(1_200.0));
        assert_eq!(unknown.score, 0);
        assert_eq!(thin.score, 10);
        assert_eq!(thin.liquidity_usd, Some(1_200.0));
    }

    #[tokio::test]
    async fn test_check_uses_chain() {
        let chain = Arc::new(MockChain::new());
        chain.set_mint(MINT, mint_info(true, false));
        chain.set_holders(MINT, holders(&[300_000_000.0, 100_000_000.0]));

        let checker = RiskChecker::new(chain, None);
        let report = checker.check(MINT).await.unwrap();

        // 35 mint authority + 20 top holder
        assert_eq!(report.score, 55);
        assert_eq!(report.level, RiskLevel::Medium);
        assert_eq!(report.mint_authority.as_deref(), Some(AUTHORITY));
    }

    #[tokio::test]
    async fn test_check_unknown_mint_fails() {
        let checker = RiskChecker::new(Arc::new(MockChain::new()), None);
        assert!(checker.check(MINT).await.is_err());
    }
}
