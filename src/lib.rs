//! Feewatch Library
//!
//! Background monitoring for Solana tokens: price alerts, large buys and
//! creator fee wallets, delivered to Telegram.

pub mod chain;
pub mod cli;
pub mod config;
pub mod dexscreener;
pub mod error;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod price;
pub mod risk;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
