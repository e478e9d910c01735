//! Async access to persisted state
//!
//! [`Store`] is the seam the watcher and command layer talk to. [`SqlStore`]
//! implements it over [`PoolStore`], running each SQLite call on tokio's
//! blocking pool so no async worker is held by disk I/O.

use std::sync::Arc;

use async_trait::async_trait;
use poolstore::{ItemKind, NotificationTarget, PoolStore, StoreError, StoreResult};
use thiserror::Error;
use tracing::debug;

/// Errors from an async store call
#[derive(Debug, Error)]
pub enum StoreCallError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type StoreCallResult<T> = Result<T, StoreCallError>;

/// Persisted state used by the watcher and the command layer
///
/// Must tolerate concurrent calls from many reconciliation passes.
#[async_trait]
pub trait Store: Send + Sync {
    async fn monitored_ids(&self, kind: ItemKind, user_id: &str) -> StoreCallResult<Vec<String>>;

    async fn persisted_balance(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<i64>;

    async fn set_persisted_balance(&self, kind: ItemKind, user_id: &str, id: &str, balance: i64)
    -> StoreCallResult<()>;

    async fn add_item(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<()>;

    async fn remove_item(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<bool>;

    async fn all_notification_targets(&self) -> StoreCallResult<Vec<NotificationTarget>>;

    async fn replace_notification_channel(&self, user_id: &str, chat_id: i64) -> StoreCallResult<()>;

    /// Drop every target of a user, whichever chat it points at
    async fn remove_user_notifications(&self, user_id: &str) -> StoreCallResult<usize>;

    /// Drop every target for a chat that can no longer be reached
    async fn remove_notification_targets(&self, chat_id: i64) -> StoreCallResult<usize>;
}

/// [`Store`] backed by SQLite
#[derive(Clone)]
pub struct SqlStore {
    inner: Arc<PoolStore>,
}

impl SqlStore {
    pub fn new(store: PoolStore) -> Self {
        Self { inner: Arc::new(store) }
    }

    async fn blocking<T, F>(&self, op: F) -> StoreCallResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&PoolStore) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || op(&inner)).await?;
        Ok(result?)
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn monitored_ids(&self, kind: ItemKind, user_id: &str) -> StoreCallResult<Vec<String>> {
        debug!(%kind, %user_id, "monitored_ids: called");
        let user_id = user_id.to_string();
        self.blocking(move |s| s.items(kind, &user_id)).await
    }

    async fn persisted_balance(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<i64> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        self.blocking(move |s| s.balance(kind, &user_id, &id)).await
    }

    async fn set_persisted_balance(
        &self,
        kind: ItemKind,
        user_id: &str,
        id: &str,
        balance: i64,
    ) -> StoreCallResult<()> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        self.blocking(move |s| s.set_balance(kind, &user_id, &id, balance)).await
    }

    async fn add_item(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<()> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        self.blocking(move |s| s.add_item(kind, &user_id, &id)).await
    }

    async fn remove_item(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<bool> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        self.blocking(move |s| s.remove_item(kind, &user_id, &id)).await
    }

    async fn all_notification_targets(&self) -> StoreCallResult<Vec<NotificationTarget>> {
        self.blocking(|s| s.all_notifications()).await
    }

    async fn replace_notification_channel(&self, user_id: &str, chat_id: i64) -> StoreCallResult<()> {
        let user_id = user_id.to_string();
        self.blocking(move |s| s.replace_notification_channel(&user_id, chat_id))
            .await
    }

    async fn remove_user_notifications(&self, user_id: &str) -> StoreCallResult<usize> {
        let user_id = user_id.to_string();
        self.blocking(move |s| s.remove_notifications_by_user(&user_id)).await
    }

    async fn remove_notification_targets(&self, chat_id: i64) -> StoreCallResult<usize> {
        self.blocking(move |s| s.remove_notifications_by_chat(chat_id)).await
    }
}
