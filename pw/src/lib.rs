//! PoolWatch - balance change notifications for pools and delegations
//!
//! Users register pool and delegation ids through chat commands. For every
//! user who asked for notifications a background task polls the chain
//! indexer, compares live balances with the last persisted ones and sends
//! one message per change.
//!
//! # Modules
//!
//! - [`watch`] - Per-subscriber task registry and the reconciliation loop
//! - [`executor`] - Bounded concurrent fan-out
//! - [`delivery`] - Message transport trait and the retry ladder
//! - [`notifier`] - Delivery plus cleanup of unreachable chats
//! - [`balance`] - Balance lookup trait and HTTP client
//! - [`store`] - Async access to persisted state
//! - [`telegram`] - Telegram Bot API client
//! - [`commands`] - Chat command parsing
//! - [`bot`] - Command execution, boot recovery and update polling
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod balance;
pub mod bot;
pub mod cli;
pub mod commands;
pub mod config;
pub mod delivery;
pub mod executor;
pub mod notifier;
pub mod store;
pub mod telegram;
pub mod watch;

#[cfg(test)]
mod test_support;

pub use balance::{BalanceError, BalanceLookup, HttpBalanceClient, ItemKind};
pub use bot::{App, UpdateSource};
pub use config::Config;
pub use delivery::{MessageTransport, ResilientDelivery, TransportError};
pub use executor::BoundedExecutor;
pub use notifier::Notifier;
pub use store::{SqlStore, Store, StoreCallError};
pub use telegram::TelegramClient;
pub use watch::{NotificationManager, Reconciler};
