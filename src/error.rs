//! Error types for the monitoring service

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feewatch
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    // HTTP API errors (price oracle, DexScreener, Telegram)
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Price lookup failed: {0}")]
    Price(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    // Persistence errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid mint account: {0}")]
    InvalidMint(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Check if this error is a transient external failure
    ///
    /// Monitors skip the item for this cycle either way; this only
    /// decides how loudly the failure is logged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::Timeout(_) | Error::Http(_) | Error::Price(_) | Error::Notify(_)
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Http(format!("request timed out: {}", e))
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
