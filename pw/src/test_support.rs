//! In-memory fakes of the collaborator traits for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use poolstore::{ItemKind, NotificationTarget, StoreError};

use crate::balance::{BalanceError, BalanceLookup};
use crate::delivery::{MessageTransport, TransportError};
use crate::store::{Store, StoreCallResult};

type ItemKey = (ItemKind, String, String);

#[derive(Default)]
pub struct FakeStore {
    items: Mutex<HashMap<(ItemKind, String), Vec<String>>>,
    balances: Mutex<HashMap<ItemKey, i64>>,
    targets: Mutex<Vec<NotificationTarget>>,
    writes: Mutex<Vec<(ItemKind, String, String, i64)>>,
    failing_lists: Mutex<HashSet<ItemKind>>,
    fail_writes: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register items with their persisted balances
    pub fn with_items(self, kind: ItemKind, user_id: &str, items: &[(&str, i64)]) -> Self {
        {
            let mut ids = self.items.lock().unwrap();
            let mut balances = self.balances.lock().unwrap();
            let list = ids.entry((kind, user_id.to_string())).or_default();
            for (id, balance) in items {
                list.push(id.to_string());
                balances.insert((kind, user_id.to_string(), id.to_string()), *balance);
            }
        }
        self
    }

    pub fn with_target(self, user_id: &str, chat_id: i64) -> Self {
        self.targets
            .lock()
            .unwrap()
            .push(NotificationTarget::new(user_id, chat_id));
        self
    }

    pub fn fail_listing(&self, kind: ItemKind) {
        self.failing_lists.lock().unwrap().insert(kind);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(ItemKind, String, String, i64)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn balance_of(&self, kind: ItemKind, user_id: &str, id: &str) -> Option<i64> {
        self.balances
            .lock()
            .unwrap()
            .get(&(kind, user_id.to_string(), id.to_string()))
            .copied()
    }

    pub fn targets(&self) -> Vec<NotificationTarget> {
        self.targets.lock().unwrap().clone()
    }
}

fn not_found(kind: ItemKind, user_id: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        user_id: user_id.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn monitored_ids(&self, kind: ItemKind, user_id: &str) -> StoreCallResult<Vec<String>> {
        if self.failing_lists.lock().unwrap().contains(&kind) {
            return Err(StoreError::Io(std::io::Error::other("database is locked")).into());
        }
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&(kind, user_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn persisted_balance(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<i64> {
        self.balance_of(kind, user_id, id)
            .ok_or_else(|| not_found(kind, user_id, id).into())
    }

    async fn set_persisted_balance(
        &self,
        kind: ItemKind,
        user_id: &str,
        id: &str,
        balance: i64,
    ) -> StoreCallResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push((kind, user_id.to_string(), id.to_string(), balance));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")).into());
        }
        self.balances
            .lock()
            .unwrap()
            .insert((kind, user_id.to_string(), id.to_string()), balance);
        Ok(())
    }

    async fn add_item(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<()> {
        let mut items = self.items.lock().unwrap();
        let list = items.entry((kind, user_id.to_string())).or_default();
        if !list.iter().any(|existing| existing == id) {
            list.push(id.to_string());
            self.balances
                .lock()
                .unwrap()
                .insert((kind, user_id.to_string(), id.to_string()), 0);
        }
        Ok(())
    }

    async fn remove_item(&self, kind: ItemKind, user_id: &str, id: &str) -> StoreCallResult<bool> {
        let mut items = self.items.lock().unwrap();
        let Some(list) = items.get_mut(&(kind, user_id.to_string())) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|existing| existing != id);
        Ok(list.len() != before)
    }

    async fn all_notification_targets(&self) -> StoreCallResult<Vec<NotificationTarget>> {
        Ok(self.targets())
    }

    async fn replace_notification_channel(&self, user_id: &str, chat_id: i64) -> StoreCallResult<()> {
        let mut targets = self.targets.lock().unwrap();
        targets.retain(|t| t.user_id != user_id);
        targets.push(NotificationTarget::new(user_id, chat_id));
        Ok(())
    }

    async fn remove_user_notifications(&self, user_id: &str) -> StoreCallResult<usize> {
        let mut targets = self.targets.lock().unwrap();
        let before = targets.len();
        targets.retain(|t| t.user_id != user_id);
        Ok(before - targets.len())
    }

    async fn remove_notification_targets(&self, chat_id: i64) -> StoreCallResult<usize> {
        let mut targets = self.targets.lock().unwrap();
        let before = targets.len();
        targets.retain(|t| t.chat_id != chat_id);
        Ok(before - targets.len())
    }
}

/// Lookup answering from a fixed table; unknown ids fail
#[derive(Default)]
pub struct FakeLookup {
    balances: Mutex<HashMap<(ItemKind, String), i64>>,
}

impl FakeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, kind: ItemKind, id: &str, balance: i64) -> Self {
        self.set(kind, id, balance);
        self
    }

    pub fn set(&self, kind: ItemKind, id: &str, balance: i64) {
        self.balances.lock().unwrap().insert((kind, id.to_string()), balance);
    }
}

#[async_trait]
impl BalanceLookup for FakeLookup {
    async fn get_balance(&self, kind: ItemKind, id: &str) -> Result<i64, BalanceError> {
        self.balances
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .copied()
            .ok_or_else(|| BalanceError::InvalidResponse(format!("missing {kind} balance for {id}")))
    }
}

/// Transport that records every send; listed chats fail as unreachable
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(i64, String)>>,
    unreachable: Mutex<HashSet<i64>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_chat(&self, chat_id: i64) {
        self.unreachable.lock().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send_raw(&self, chat_id: i64, text: &str, _formatted: bool) -> Result<(), TransportError> {
        if self.unreachable.lock().unwrap().contains(&chat_id) {
            return Err(TransportError::Unreachable("Forbidden: bot was blocked by the user".to_string()));
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}
