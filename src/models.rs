//! Watch records shared by the store, the monitors and the CLI

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Which side of the target price fires an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Above,
    Below,
}

impl AlertDirection {
    /// Inclusive comparison of an observed price against the target
    pub fn is_crossed(&self, current: f64, target: f64) -> bool {
        match self {
            AlertDirection::Above => current >= target,
            AlertDirection::Below => current <= target,
        }
    }
}

impl fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertDirection::Above => write!(f, "above"),
            AlertDirection::Below => write!(f, "below"),
        }
    }
}

impl FromStr for AlertDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "above" => Ok(AlertDirection::Above),
            "below" => Ok(AlertDirection::Below),
            other => Err(Error::Config(format!(
                "direction must be 'above' or 'below', got '{}'",
                other
            ))),
        }
    }
}

/// A user's price alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedAlert {
    pub id: String,
    pub user_id: String,
    pub token_address: String,
    pub token_symbol: String,
    pub target_price: f64,
    pub direction: AlertDirection,
    pub is_active: bool,
    /// Terminal once set
    pub is_triggered: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub triggered_price: Option<f64>,
}

impl WatchedAlert {
    /// Should the monitor look at this alert at all
    pub fn is_pending(&self) -> bool {
        self.is_active && !self.is_triggered
    }

    /// Would this price fire the alert
    pub fn should_trigger(&self, current_price: f64) -> bool {
        self.is_pending() && self.direction.is_crossed(current_price, self.target_price)
    }
}

/// Fields supplied when a user creates an alert
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub user_id: String,
    pub token_address: String,
    pub token_symbol: String,
    pub target_price: f64,
    pub direction: AlertDirection,
}

impl NewAlert {
    pub fn into_alert(self) -> WatchedAlert {
        WatchedAlert {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id,
            token_address: self.token_address,
            token_symbol: self.token_symbol,
            target_price: self.target_price,
            direction: self.direction,
            is_active: true,
            is_triggered: false,
            created_at: Utc::now(),
            triggered_at: None,
            triggered_price: None,
        }
    }
}

/// Persisted per-user token monitoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub user_id: String,
    pub mint: String,
    #[serde(default)]
    pub fee_wallet: Option<String>,
    /// Only written when cursor persistence is enabled
    #[serde(default)]
    pub last_checked_signature: Option<String>,
    /// Slot of `last_checked_signature`
    #[serde(default)]
    pub last_checked_slot: Option<u64>,
    #[serde(default)]
    pub last_fee_balance: Option<f64>,
}

impl TokenConfig {
    pub fn new(user_id: impl Into<String>, mint: impl Into<String>, fee_wallet: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            mint: mint.into(),
            fee_wallet,
            last_checked_signature: None,
            last_checked_slot: None,
            last_fee_balance: None,
        }
    }
}

/// Notification categories a user can opt in or out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    PriceAlert,
    LargeBuy,
    FeeReady,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventCategory::PriceAlert => write!(f, "price_alert"),
            EventCategory::LargeBuy => write!(f, "large_buy"),
            EventCategory::FeeReady => write!(f, "fee_ready"),
        }
    }
}

/// Per-user notification destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub user_id: String,
    /// Telegram chat id
    pub chat_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub price_alerts: bool,
    #[serde(default = "default_true")]
    pub large_buys: bool,
    #[serde(default = "default_true")]
    pub fee_ready: bool,
}

fn default_true() -> bool {
    true
}

impl ChannelConfig {
    pub fn new(user_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            enabled: true,
            price_alerts: true,
            large_buys: true,
            fee_ready: true,
        }
    }

    /// Destination for this category, if the user wants it
    pub fn destination_for(&self, category: EventCategory) -> Option<&str> {
        if !self.enabled || self.chat_id.trim().is_empty() {
            return None;
        }

        let wanted = match category {
            EventCategory::PriceAlert => self.price_alerts,
            EventCategory::LargeBuy => self.large_buys,
            EventCategory::FeeReady => self.fee_ready,
        };

        wanted.then_some(self.chat_id.as_str())
    }
}
