//! App - the chat front end of the watcher
//!
//! The App is responsible for:
//! - Executing chat commands against the store and the balance lookup
//! - Starting and stopping per-subscriber watch tasks
//! - Re-starting every persisted notification target at boot
//! - Polling the bot API for updates until the process scope is cancelled
//!
//! Every reply goes through the [`Notifier`], so a chat that blocked the bot
//! loses its notification targets the first time a reply bounces.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::balance::{BalanceLookup, ItemKind};
use crate::commands::{self, Command, HELP_TEXT};
use crate::config::NotifyConfig;
use crate::delivery::{MessageTransport, ResilientDelivery, TransportError};
use crate::executor::BoundedExecutor;
use crate::notifier::Notifier;
use crate::store::{Store, StoreCallResult};
use crate::telegram::Update;
use crate::watch::{NotificationManager, Reconciler};

/// Reply used when a command fails on our side
pub const COMMAND_ERROR: &str = "Something went wrong. Please try again later.";

/// Pause after a failed poll before asking again
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Source of incoming chat updates
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Updates after `offset`, waiting up to `timeout_secs` for the first one
    async fn poll(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, TransportError>;
}

pub struct App {
    store: Arc<dyn Store>,
    lookup: Arc<dyn BalanceLookup>,
    notifier: Notifier,
    manager: NotificationManager,
    reconciler: Reconciler,
    executor: BoundedExecutor,
    root: CancellationToken,
}

impl App {
    pub fn new(
        store: Arc<dyn Store>,
        lookup: Arc<dyn BalanceLookup>,
        transport: Arc<dyn MessageTransport>,
        config: &NotifyConfig,
        root: CancellationToken,
    ) -> Self {
        debug!(?config, "App::new: called");
        let notifier = Notifier::new(ResilientDelivery::new(transport), Arc::clone(&store));
        let executor = BoundedExecutor::new(config.fetch_concurrency);
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&lookup),
            notifier.clone(),
            executor,
            config.poll_interval(),
        );
        Self {
            store,
            lookup,
            notifier,
            manager: NotificationManager::new(),
            reconciler,
            executor,
            root,
        }
    }

    pub fn manager(&self) -> &NotificationManager {
        &self.manager
    }

    /// Start a watch task for every persisted notification target
    ///
    /// Returns how many tasks were started. A user with several targets gets
    /// one task, bound to the first target found.
    pub async fn recover_notifications(&self) -> StoreCallResult<usize> {
        debug!("recover_notifications: called");
        let targets = self.store.all_notification_targets().await?;
        let mut started = 0;
        for target in &targets {
            if self.start_watch(&target.user_id, target.chat_id) {
                started += 1;
            }
        }
        info!(targets = targets.len(), started, "Recovered notifications");
        Ok(started)
    }

    /// Launch the watch loop for `user_id`, reporting into `chat_id`
    pub fn start_watch(&self, user_id: &str, chat_id: i64) -> bool {
        let reconciler = self.reconciler.clone();
        let subscriber = user_id.to_string();
        self.manager.start(&self.root, user_id, move |cancel| async move {
            reconciler.run(subscriber, chat_id, cancel).await;
        })
    }

    /// Parse and execute one message; `None` when the text is not a command
    pub async fn handle_message(&self, user_id: &str, chat_id: i64, text: &str) -> Option<String> {
        debug!(%user_id, chat_id, "handle_message: called");
        match commands::parse(text) {
            Ok(command) => Some(self.execute(user_id, chat_id, command).await),
            Err(e) if e.is_silent() => None,
            Err(e) => Some(e.to_string()),
        }
    }

    /// Execute a command and return the reply text
    pub async fn execute(&self, user_id: &str, chat_id: i64, command: Command) -> String {
        debug!(%user_id, chat_id, ?command, "execute: called");
        match command {
            Command::Help => HELP_TEXT.to_string(),
            Command::Add(kind, id) => self.add_item(kind, user_id, &id).await,
            Command::Remove(kind, id) => self.remove_item(kind, user_id, &id).await,
            Command::List(kind) => self.list_items(kind, user_id).await,
            Command::Balance => self.total_balance(user_id).await,
            Command::NotifyStart => self.notify_start(user_id, chat_id).await,
            Command::NotifyStop => self.notify_stop(user_id).await,
            Command::NotifyStatus => {
                if self.manager.active(user_id) {
                    "Subscribed".to_string()
                } else {
                    "Not Subscribed".to_string()
                }
            }
        }
    }

    async fn add_item(&self, kind: ItemKind, user_id: &str, id: &str) -> String {
        match self.store.add_item(kind, user_id, id).await {
            Ok(()) => {
                info!(%kind, %user_id, %id, "Item added");
                format!("{} added", title(kind))
            }
            Err(e) => {
                error!(%kind, %user_id, error = %e, "Error adding item");
                COMMAND_ERROR.to_string()
            }
        }
    }

    async fn remove_item(&self, kind: ItemKind, user_id: &str, id: &str) -> String {
        match self.store.remove_item(kind, user_id, id).await {
            Ok(true) => format!("{} removed", title(kind)),
            Ok(false) => format!("{} not found", title(kind)),
            Err(e) => {
                error!(%kind, %user_id, error = %e, "Error removing item");
                COMMAND_ERROR.to_string()
            }
        }
    }

    /// Live balances of every item of `kind`
    async fn list_items(&self, kind: ItemKind, user_id: &str) -> String {
        let ids = match self.store.monitored_ids(kind, user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(%kind, %user_id, error = %e, "Error listing items");
                return COMMAND_ERROR.to_string();
            }
        };
        if ids.is_empty() {
            return format!("You have no {}", kind.plural());
        }

        let balances = match self.fetch_balances(kind, ids.clone()).await {
            Ok(balances) => balances,
            Err(reply) => return reply,
        };

        let mut reply = String::new();
        for id in &ids {
            let balance = balances.get(id).copied().unwrap_or_default();
            if kind == ItemKind::Pool && balance == 0 {
                reply.push_str(&format!("`{id}`: `decommissioned`\n"));
            } else {
                reply.push_str(&format!("`{id}`: {} ML\n", group_thousands(balance)));
            }
        }
        reply
    }

    /// Summed balances of every pool and delegation
    async fn total_balance(&self, user_id: &str) -> String {
        let mut counts = [0usize; 2];
        let mut sums = [0i64; 2];
        for (slot, kind) in ItemKind::ALL.into_iter().enumerate() {
            let ids = match self.store.monitored_ids(kind, user_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!(%kind, %user_id, error = %e, "Error listing items");
                    return COMMAND_ERROR.to_string();
                }
            };
            counts[slot] = ids.len();
            sums[slot] = match self.fetch_balances(kind, ids).await {
                Ok(balances) => balances.values().fold(0i64, |acc, b| acc.saturating_add(*b)),
                Err(reply) => return reply,
            };
        }

        format!(
            "`{}` pools: `{} ML`\n`{}` delegations: `{} ML`\nTotal: `{} ML`",
            counts[0],
            group_thousands(sums[0]),
            counts[1],
            group_thousands(sums[1]),
            group_thousands(sums[0].saturating_add(sums[1])),
        )
    }

    /// Bounded lookup of every id; the error side is the reply to send
    async fn fetch_balances(&self, kind: ItemKind, ids: Vec<String>) -> Result<HashMap<String, i64>, String> {
        self.executor
            .map(ids, |id| async move { self.lookup.get_balance(kind, &id).await })
            .await
            .map_err(|e| {
                error!(%kind, error = %e, "Error getting balance");
                format!("Error getting {} balance: {e}", kind.name())
            })
    }

    /// Point the user's notifications at this chat and (re)start the watch
    async fn notify_start(&self, user_id: &str, chat_id: i64) -> String {
        if let Err(e) = self.store.replace_notification_channel(user_id, chat_id).await {
            error!(%user_id, chat_id, error = %e, "Error adding notification");
            return COMMAND_ERROR.to_string();
        }
        // The old task may still report into the previous chat
        self.manager.stop(user_id);
        if self.start_watch(user_id, chat_id) {
            "Notifications Active".to_string()
        } else {
            "Notification already Active".to_string()
        }
    }

    /// Stop the watch and forget the user's target, whichever chat asks
    async fn notify_stop(&self, user_id: &str) -> String {
        if !self.manager.stop(user_id) {
            debug!(%user_id, "notify_stop: not subscribed");
            return "Not Subscribed".to_string();
        }
        match self.store.remove_user_notifications(user_id).await {
            Ok(removed) => {
                info!(%user_id, removed, "Notifications stopped");
                "Notifications Stopped".to_string()
            }
            Err(e) => {
                error!(%user_id, error = %e, "Error removing notification");
                COMMAND_ERROR.to_string()
            }
        }
    }

    /// Poll for updates and answer them until `cancel` fires
    ///
    /// Updates are handled one at a time in arrival order.
    pub async fn serve(&self, source: &dyn UpdateSource, poll_timeout_secs: u64, cancel: &CancellationToken) {
        info!(poll_timeout_secs, "Listening for commands");
        let mut offset = None;
        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = source.poll(offset, poll_timeout_secs) => polled,
            };

            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, backoff = ?POLL_ERROR_BACKOFF, "Error polling for updates");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                self.handle_update(update).await;
            }
        }
        info!("Stopped listening for commands");
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let (Some(from), Some(text)) = (message.from, message.text) else {
            return;
        };
        info!(user = %from.first_name, text = %text, "Received message");
        let user_id = from.id.to_string();
        if let Some(reply) = self.handle_message(&user_id, message.chat.id, &text).await {
            self.notifier.notify(message.chat.id, &reply).await;
        }
    }

    /// Stop every watch task and wait for them to exit
    pub async fn shutdown(&self) {
        info!(active = self.manager.len(), "Shutting down notifications");
        self.manager.stop_all().await;
    }
}

fn title(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Pool => "Pool",
        ItemKind::Delegation => "Delegation",
    }
}

/// Format with comma thousands separators, e.g. `1,234,567`
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
