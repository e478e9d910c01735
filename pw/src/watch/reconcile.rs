//! Reconciler - the per-subscriber balance watch loop
//!
//! One pass fetches every monitored pool and delegation, compares the live
//! balance with the persisted one and reports each change to the
//! subscriber's chat. Pools and delegations are reconciled concurrently,
//! each as a bounded fan-out. A failing item is reported and skipped; the
//! rest of the pass carries on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::balance::{BalanceLookup, ItemKind};
use crate::executor::BoundedExecutor;
use crate::notifier::{Delivery, Notifier};
use crate::store::Store;

/// Per-pass outcome counters
#[derive(Debug, Default)]
pub struct PassStats {
    unchanged: AtomicUsize,
    changed: AtomicUsize,
    failed: AtomicUsize,
    chat_unreachable: AtomicBool,
}

impl PassStats {
    pub fn unchanged(&self) -> usize {
        self.unchanged.load(Ordering::Relaxed)
    }

    pub fn changed(&self) -> usize {
        self.changed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Whether a message bounced because the chat is gone
    pub fn chat_unreachable(&self) -> bool {
        self.chat_unreachable.load(Ordering::Relaxed)
    }

    fn record(&self, counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Text of a balance change message, e.g. `p2: +2 ML`
pub fn format_delta(id: &str, delta: i64) -> String {
    let sign = if delta >= 0 { '+' } else { '-' };
    format!("{id}: {sign}{} ML", delta.unsigned_abs())
}

/// Runs reconciliation passes for one subscriber at a time
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    lookup: Arc<dyn BalanceLookup>,
    notifier: Notifier,
    executor: BoundedExecutor,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        lookup: Arc<dyn BalanceLookup>,
        notifier: Notifier,
        executor: BoundedExecutor,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            lookup,
            notifier,
            executor,
            interval,
        }
    }

    /// Watch loop: a pass right away, then one per interval until cancelled
    ///
    /// Cancellation is observed before each pass and during the wait. A pass
    /// already running is allowed to finish. The loop also ends on its own
    /// once the chat turns out to be unreachable.
    pub async fn run(&self, subscriber: String, chat_id: i64, cancel: CancellationToken) {
        info!(%subscriber, chat_id, interval = ?self.interval, "Notification routine started");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let stats = self.run_pass(&subscriber, chat_id).await;
            debug!(
                %subscriber,
                unchanged = stats.unchanged(),
                changed = stats.changed(),
                failed = stats.failed(),
                "run: pass complete"
            );
            if stats.chat_unreachable() {
                info!(%subscriber, chat_id, "Chat unreachable, ending notification routine");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(%subscriber, "Stopping notification");
    }

    /// One reconciliation pass over every monitored item of `subscriber`
    pub async fn run_pass(&self, subscriber: &str, chat_id: i64) -> PassStats {
        debug!(%subscriber, chat_id, "run_pass: called");
        let stats = PassStats::default();
        tokio::join!(
            self.reconcile_kind(ItemKind::Pool, subscriber, chat_id, &stats),
            self.reconcile_kind(ItemKind::Delegation, subscriber, chat_id, &stats),
        );
        stats
    }

    async fn reconcile_kind(&self, kind: ItemKind, subscriber: &str, chat_id: i64, stats: &PassStats) {
        let ids = match self.store.monitored_ids(kind, subscriber).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(%kind, %subscriber, error = %e, "Error getting monitored items");
                stats.record(&stats.failed);
                self.report(chat_id, &format!("Error getting {}: {e}", kind.plural()), stats).await;
                return;
            }
        };
        debug!(%kind, %subscriber, count = ids.len(), "reconcile_kind: fetched ids");

        self.executor
            .for_each(ids, |id| async move {
                self.reconcile_item(kind, subscriber, &id, chat_id, stats).await;
            })
            .await;
    }

    async fn reconcile_item(&self, kind: ItemKind, subscriber: &str, id: &str, chat_id: i64, stats: &PassStats) {
        let current = match self.lookup.get_balance(kind, id).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(%kind, %id, error = %e, "Error fetching balance");
                stats.record(&stats.failed);
                self.report(chat_id, &format!("Error fetching balance: {e}"), stats).await;
                return;
            }
        };
        let persisted = match self.store.persisted_balance(kind, subscriber, id).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(%kind, %id, error = %e, "Error fetching persisted balance");
                stats.record(&stats.failed);
                self.report(chat_id, &format!("Error fetching balance: {e}"), stats).await;
                return;
            }
        };

        if current == persisted {
            stats.record(&stats.unchanged);
            return;
        }

        let written = self.store.set_persisted_balance(kind, subscriber, id, current).await;
        let delta = current.saturating_sub(persisted);
        info!(%kind, %id, persisted, current, "Balance changed");
        stats.record(&stats.changed);
        self.report(chat_id, &format_delta(id, delta), stats).await;

        if let Err(e) = written {
            error!(%kind, %id, error = %e, "Error updating balance");
            self.report(chat_id, &format!("Error updating balance: {e}"), stats).await;
        }
    }

    async fn report(&self, chat_id: i64, text: &str, stats: &PassStats) {
        if self.notifier.notify(chat_id, text).await == Delivery::Unreachable {
            stats.chat_unreachable.store(true, Ordering::Relaxed);
        }
    }
}
