//! Balance watching
//!
//! [`NotificationManager`] owns one background task per subscriber;
//! [`Reconciler`] is the body each of those tasks runs.

mod manager;
mod reconcile;

pub use manager::NotificationManager;
pub use reconcile::{PassStats, Reconciler, format_delta};
