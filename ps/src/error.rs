//! Store error types

use thiserror::Error;

use crate::ItemKind;

/// Errors returned by [`crate::PoolStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} {id} is not monitored for user {user_id}")]
    NotFound { kind: ItemKind, user_id: String, id: String },
}

impl StoreError {
    /// True when the requested row does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
