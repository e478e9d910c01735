//! Balance lookup error types

use thiserror::Error;

/// Errors that can occur while fetching a balance
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BalanceError {
    /// Check if another attempt could succeed
    ///
    /// Only transport failures are retried; any answer from the server,
    /// including a 5xx, is final for this lookup.
    pub fn is_retryable(&self) -> bool {
        match self {
            BalanceError::Network(e) => e.is_timeout() || e.is_connect(),
            BalanceError::Status { .. } | BalanceError::InvalidResponse(_) => false,
        }
    }
}
