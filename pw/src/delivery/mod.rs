//! Outbound message delivery
//!
//! [`MessageTransport`] is the raw send primitive (one HTTP call, no
//! retries). [`ResilientDelivery`] wraps it with a fixed escalation ladder:
//!
//! 1. formatted send
//! 2. on rate limit with a wait: sleep once, resend formatted
//! 3. on rejected formatting (either previous attempt): resend as plain text
//! 4. anything left is returned unchanged
//!
//! Delivery never touches storage. Reacting to an unreachable destination is
//! the caller's job, see [`crate::notifier::Notifier`].

mod error;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

pub use error::TransportError;

/// Raw message transport
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send `text` to `chat_id` once; `formatted` enables rich-text markup
    async fn send_raw(&self, chat_id: i64, text: &str, formatted: bool) -> Result<(), TransportError>;
}

/// Sends one message through an unreliable transport
#[derive(Clone)]
pub struct ResilientDelivery {
    transport: Arc<dyn MessageTransport>,
}

impl ResilientDelivery {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self { transport }
    }

    /// Deliver `text`, retrying per the escalation ladder
    pub async fn send(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        debug!(chat_id, len = text.len(), "send: called");
        let mut outcome = self.transport.send_raw(chat_id, text, true).await;

        let wait = outcome.as_ref().err().and_then(TransportError::retry_after);
        if let Some(wait) = wait {
            warn!(chat_id, ?wait, "send: rate limited, backing off before retry");
            tokio::time::sleep(wait).await;
            outcome = self.transport.send_raw(chat_id, text, true).await;
        }

        let rejected = matches!(&outcome, Err(e) if e.is_formatting_rejected());
        if rejected {
            debug!(chat_id, "send: formatting rejected, retrying as plain text");
            outcome = self.transport.send_raw(chat_id, text, false).await;
        }

        if let Err(e) = &outcome {
            warn!(chat_id, error = %e, "Error sending message");
        }
        outcome
    }
}
