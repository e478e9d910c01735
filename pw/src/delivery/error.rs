//! Message transport error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while sending a message
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Formatting rejected: {0}")]
    FormattingRejected(String),

    #[error("Destination unreachable: {0}")]
    Unreachable(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Get the wait duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Check if the message's rich-text markup was rejected
    pub fn is_formatting_rejected(&self) -> bool {
        matches!(self, TransportError::FormattingRejected(_))
    }

    /// Check if the destination can no longer be delivered to at all
    ///
    /// Callers should drop every notification target for the chat.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Unreachable(_))
    }
}
