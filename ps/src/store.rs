//! PoolStore implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::{ItemKind, StoreError, StoreResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    chat_id INTEGER NOT NULL,
    UNIQUE(user_id, chat_id) ON CONFLICT IGNORE
);
CREATE TABLE IF NOT EXISTS pools (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    pool_id TEXT NOT NULL,
    balance INTEGER NOT NULL DEFAULT 0,
    UNIQUE(user_id, pool_id) ON CONFLICT IGNORE
);
CREATE TABLE IF NOT EXISTS delegations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    delegation_id TEXT NOT NULL,
    balance INTEGER NOT NULL DEFAULT 0,
    UNIQUE(user_id, delegation_id) ON CONFLICT IGNORE
);
";

/// A persisted (user, chat) pair saying where a user's notifications go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTarget {
    pub user_id: String,
    pub chat_id: i64,
}

impl NotificationTarget {
    pub fn new(user_id: impl Into<String>, chat_id: i64) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id,
        }
    }
}

/// SQLite-backed store
///
/// The connection is guarded by a mutex so one store can be shared across
/// threads; each call holds the lock only for its own statements.
pub struct PoolStore {
    conn: Mutex<Connection>,
}

impl PoolStore {
    /// Open (or create) the database at `path` and apply the schema
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "PoolStore::open: called");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "PoolStore opened");
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("PoolStore::open_in_memory: called");
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        apply_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite itself inconsistent
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // === Monitored items ===

    /// Start monitoring an item for a user; a duplicate is ignored
    pub fn add_item(&self, kind: ItemKind, user_id: &str, item_id: &str) -> StoreResult<()> {
        debug!(%kind, %user_id, %item_id, "add_item: called");
        let sql = format!(
            "INSERT INTO {} (user_id, {}, balance) VALUES (?1, ?2, 0)",
            kind.table(),
            kind.id_column()
        );
        self.conn().execute(&sql, params![user_id, item_id])?;
        Ok(())
    }

    /// Stop monitoring an item; returns whether a row was removed
    pub fn remove_item(&self, kind: ItemKind, user_id: &str, item_id: &str) -> StoreResult<bool> {
        debug!(%kind, %user_id, %item_id, "remove_item: called");
        let sql = format!("DELETE FROM {} WHERE user_id = ?1 AND {} = ?2", kind.table(), kind.id_column());
        let removed = self.conn().execute(&sql, params![user_id, item_id])?;
        Ok(removed > 0)
    }

    /// Items of one kind monitored by a user, in insertion order
    pub fn items(&self, kind: ItemKind, user_id: &str) -> StoreResult<Vec<String>> {
        debug!(%kind, %user_id, "items: called");
        let sql = format!("SELECT {} FROM {} WHERE user_id = ?1 ORDER BY id", kind.id_column(), kind.table());
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(%kind, %user_id, count = ids.len(), "items: loaded");
        Ok(ids)
    }

    /// Last balance persisted for an item
    pub fn balance(&self, kind: ItemKind, user_id: &str, item_id: &str) -> StoreResult<i64> {
        debug!(%kind, %user_id, %item_id, "balance: called");
        let sql = format!(
            "SELECT balance FROM {} WHERE user_id = ?1 AND {} = ?2",
            kind.table(),
            kind.id_column()
        );
        self.conn()
            .query_row(&sql, params![user_id, item_id], |row| row.get::<_, i64>(0))
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind,
                user_id: user_id.to_string(),
                id: item_id.to_string(),
            })
    }

    /// Persist a new balance for an item
    pub fn set_balance(&self, kind: ItemKind, user_id: &str, item_id: &str, balance: i64) -> StoreResult<()> {
        debug!(%kind, %user_id, %item_id, balance, "set_balance: called");
        let sql = format!(
            "UPDATE {} SET balance = ?1 WHERE user_id = ?2 AND {} = ?3",
            kind.table(),
            kind.id_column()
        );
        let updated = self.conn().execute(&sql, params![balance, user_id, item_id])?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind,
                user_id: user_id.to_string(),
                id: item_id.to_string(),
            });
        }
        Ok(())
    }

    // === Notification targets ===

    /// Drop every target of a user; returns how many were removed
    pub fn remove_notifications_by_user(&self, user_id: &str) -> StoreResult<usize> {
        debug!(%user_id, "remove_notifications_by_user: called");
        let removed = self
            .conn()
            .execute("DELETE FROM notifications WHERE user_id = ?1", params![user_id])?;
        info!(%user_id, removed, "Removed notification targets for user");
        Ok(removed)
    }

    /// Make `chat_id` the only notification target of a user
    pub fn replace_notification_channel(&self, user_id: &str, chat_id: i64) -> StoreResult<()> {
        debug!(%user_id, chat_id, "replace_notification_channel: called");
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notifications WHERE user_id = ?1", params![user_id])?;
        tx.execute(
            "INSERT INTO notifications (user_id, chat_id) VALUES (?1, ?2)",
            params![user_id, chat_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Drop every target pointing at a chat; returns how many were removed
    pub fn remove_notifications_by_chat(&self, chat_id: i64) -> StoreResult<usize> {
        debug!(chat_id, "remove_notifications_by_chat: called");
        let removed = self
            .conn()
            .execute("DELETE FROM notifications WHERE chat_id = ?1", params![chat_id])?;
        info!(chat_id, removed, "Removed notification targets for chat");
        Ok(removed)
    }

    pub fn all_notifications(&self) -> StoreResult<Vec<NotificationTarget>> {
        debug!("all_notifications: called");
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT user_id, chat_id FROM notifications ORDER BY id")?;
        let targets = stmt
            .query_map([], |row| {
                Ok(NotificationTarget {
                    user_id: row.get(0)?,
                    chat_id: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }
}

fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
    debug!("apply_pragmas: called");
    // journal_mode reports the resulting mode as a row
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    debug!(%mode, "apply_pragmas: applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, PoolStore) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = PoolStore::open(dir.path().join("pools.db")).expect("Failed to open store");
        (dir, store)
    }

    #[test]
    fn test_open_applies_pragmas() {
        let (_dir, store) = temp_store();
        let conn = store.conn();
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);
        let timeout: i64 = conn.query_row("PRAGMA busy_timeout", [], |r| r.get(0)).unwrap();
        assert_eq!(timeout, 5000);
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("pools.db");
        PoolStore::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_items_are_scoped_by_kind_and_user() {
        let (_dir, store) = temp_store();
        store.add_item(ItemKind::Pool, "42", "p1").unwrap();
        store.add_item(ItemKind::Pool, "42", "p2").unwrap();
        store.add_item(ItemKind::Pool, "7", "p3").unwrap();
        store.add_item(ItemKind::Delegation, "42", "d1").unwrap();

        assert_eq!(store.items(ItemKind::Pool, "42").unwrap(), vec!["p1", "p2"]);
        assert_eq!(store.items(ItemKind::Delegation, "42").unwrap(), vec!["d1"]);
        assert_eq!(store.items(ItemKind::Pool, "7").unwrap(), vec!["p3"]);
        assert!(store.items(ItemKind::Delegation, "7").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_item_is_ignored() {
        let (_dir, store) = temp_store();
        store.add_item(ItemKind::Pool, "42", "p1").unwrap();
        store.set_balance(ItemKind::Pool, "42", "p1", 9).unwrap();
        store.add_item(ItemKind::Pool, "42", "p1").unwrap();

        assert_eq!(store.items(ItemKind::Pool, "42").unwrap(), vec!["p1"]);
        // The duplicate insert must not reset the persisted balance
        assert_eq!(store.balance(ItemKind::Pool, "42", "p1").unwrap(), 9);
    }

    #[test]
    fn test_remove_item() {
        let (_dir, store) = temp_store();
        store.add_item(ItemKind::Delegation, "42", "d1").unwrap();

        assert!(store.remove_item(ItemKind::Delegation, "42", "d1").unwrap());
        assert!(!store.remove_item(ItemKind::Delegation, "42", "d1").unwrap());
        assert!(store.items(ItemKind::Delegation, "42").unwrap().is_empty());
    }

    #[test]
    fn test_balance_roundtrip_and_default() {
        let (_dir, store) = temp_store();
        store.add_item(ItemKind::Pool, "42", "p1").unwrap();
        assert_eq!(store.balance(ItemKind::Pool, "42", "p1").unwrap(), 0);

        store.set_balance(ItemKind::Pool, "42", "p1", 1234).unwrap();
        assert_eq!(store.balance(ItemKind::Pool, "42", "p1").unwrap(), 1234);
    }

    #[test]
    fn test_balance_missing_item_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store.balance(ItemKind::Pool, "42", "nope").unwrap_err();
        assert!(err.is_not_found());

        let err = store.set_balance(ItemKind::Delegation, "42", "nope", 1).unwrap_err();
        assert!(err.is_not_found());
    }

    /// Raw insert, so tests can set up states the public API never produces
    fn insert_target(store: &PoolStore, user_id: &str, chat_id: i64) {
        store
            .conn()
            .execute(
                "INSERT INTO notifications (user_id, chat_id) VALUES (?1, ?2)",
                params![user_id, chat_id],
            )
            .unwrap();
    }

    #[test]
    fn test_notification_targets_ignore_duplicates() {
        let (_dir, store) = temp_store();
        insert_target(&store, "42", 100);
        insert_target(&store, "42", 100);
        store.replace_notification_channel("7", 200).unwrap();

        assert_eq!(
            store.all_notifications().unwrap(),
            vec![NotificationTarget::new("42", 100), NotificationTarget::new("7", 200)]
        );
    }

    #[test]
    fn test_replace_notification_channel() {
        let (_dir, store) = temp_store();
        insert_target(&store, "42", 100);
        insert_target(&store, "42", 101);
        insert_target(&store, "7", 100);

        store.replace_notification_channel("42", 300).unwrap();

        let mut targets = store.all_notifications().unwrap();
        targets.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        assert_eq!(
            targets,
            vec![NotificationTarget::new("42", 300), NotificationTarget::new("7", 100)]
        );
    }

    #[test]
    fn test_remove_notifications_by_user() {
        let (_dir, store) = temp_store();
        insert_target(&store, "42", 100);
        insert_target(&store, "42", 101);
        insert_target(&store, "7", 100);

        assert_eq!(store.remove_notifications_by_user("42").unwrap(), 2);
        assert_eq!(store.all_notifications().unwrap(), vec![NotificationTarget::new("7", 100)]);
        assert_eq!(store.remove_notifications_by_user("42").unwrap(), 0);
    }

    #[test]
    fn test_remove_notifications_by_chat() {
        let (_dir, store) = temp_store();
        insert_target(&store, "42", 100);
        insert_target(&store, "7", 100);
        insert_target(&store, "7", 200);

        assert_eq!(store.remove_notifications_by_chat(100).unwrap(), 2);
        assert_eq!(store.all_notifications().unwrap(), vec![NotificationTarget::new("7", 200)]);
        assert_eq!(store.remove_notifications_by_chat(100).unwrap(), 0);
    }

    #[test]
    fn test_in_memory_store() {
        let store = PoolStore::open_in_memory().unwrap();
        store.add_item(ItemKind::Pool, "1", "p").unwrap();
        assert_eq!(store.items(ItemKind::Pool, "1").unwrap(), vec!["p"]);
    }
}
