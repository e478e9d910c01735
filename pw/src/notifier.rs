//! Best-effort user notifications
//!
//! Wraps [`ResilientDelivery`] with the one storage side effect delivery is
//! not allowed to have: when a chat turns out to be permanently
//! unreachable, every notification target pointing at it is removed so the
//! watcher stops writing into the void after the next restart. The caller
//! learns about it through [`Delivery::Unreachable`] and can end its own
//! watch right away.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::delivery::ResilientDelivery;
use crate::store::Store;

/// Outcome of one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed,
    /// The chat is gone for good and its targets were removed
    Unreachable,
}

#[derive(Clone)]
pub struct Notifier {
    delivery: ResilientDelivery,
    store: Arc<dyn Store>,
}

impl Notifier {
    pub fn new(delivery: ResilientDelivery, store: Arc<dyn Store>) -> Self {
        Self { delivery, store }
    }

    /// Send `text` to `chat_id`
    pub async fn notify(&self, chat_id: i64, text: &str) -> Delivery {
        debug!(chat_id, "notify: called");
        let err = match self.delivery.send(chat_id, text).await {
            Ok(()) => return Delivery::Sent,
            Err(e) => e,
        };

        if !err.is_unreachable() {
            return Delivery::Failed;
        }
        info!(chat_id, error = %err, "Chat unreachable, removing notification targets");
        if let Err(e) = self.store.remove_notification_targets(chat_id).await {
            error!(chat_id, error = %e, "Error removing notifications for chat");
        }
        Delivery::Unreachable
    }
}
