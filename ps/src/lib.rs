//! PoolStore - SQLite persistence for the pool watcher
//!
//! Holds the three tables the watcher needs: monitored pools, monitored
//! delegations (each with the last balance that was reported to the user),
//! and the notification targets that say which chat a user's balance
//! changes are delivered to.
//!
//! The store is synchronous. Async callers are expected to move calls onto
//! a blocking thread.

mod error;
mod kind;
mod store;

pub use error::{StoreError, StoreResult};
pub use kind::ItemKind;
pub use store::{NotificationTarget, PoolStore};
