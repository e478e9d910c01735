//! Balance lookup
//!
//! The watcher only needs one capability from the chain indexer: the
//! current balance of a pool or delegation, in whole coins.

mod client;
mod error;

use async_trait::async_trait;

pub use client::{ATOMS_PER_COIN, HttpBalanceClient, atoms_to_coins};
pub use error::BalanceError;
pub use poolstore::ItemKind;

/// Source of current balances
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait BalanceLookup: Send + Sync {
    /// Current balance of `id` in whole coins
    async fn get_balance(&self, kind: ItemKind, id: &str) -> Result<i64, BalanceError>;
}
