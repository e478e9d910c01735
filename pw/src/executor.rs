//! Bounded fan-out over a list of keys
//!
//! Balance lookups are network round trips, so a subscriber with many pools
//! must not open an unbounded number of requests at once. Both operations
//! here run one unit of work per key with at most `limit` in flight.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use futures::StreamExt;
use futures::stream;
use tracing::debug;

/// Default number of concurrent units
pub const DEFAULT_LIMIT: usize = 10;

/// Runs per-key work with a concurrency ceiling
#[derive(Debug, Clone, Copy)]
pub struct BoundedExecutor {
    limit: usize,
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}

impl BoundedExecutor {
    /// A limit of zero is treated as one
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fetch a value for every key and collect them by key
    ///
    /// Every unit runs to completion even after a failure. If any unit
    /// failed, the first error observed is returned and the successful
    /// results are dropped.
    pub async fn map<K, V, E, F, Fut>(&self, keys: Vec<K>, fetch: F) -> Result<HashMap<K, V>, E>
    where
        K: Eq + Hash + Clone,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        debug!(key_count = keys.len(), limit = self.limit, "BoundedExecutor::map: called");
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut results = HashMap::with_capacity(keys.len());
        let mut first_error = None;
        let mut units = stream::iter(keys)
            .map(|key| {
                let unit = fetch(key.clone());
                async move { (key, unit.await) }
            })
            .buffer_unordered(self.limit);

        while let Some((key, outcome)) = units.next().await {
            match outcome {
                Ok(value) => {
                    results.insert(key, value);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => {
                debug!("BoundedExecutor::map: at least one unit failed");
                Err(e)
            }
            None => Ok(results),
        }
    }

    /// Run `task` for every key; failures are the task's own business
    pub async fn for_each<K, F, Fut>(&self, keys: Vec<K>, task: F)
    where
        F: Fn(K) -> Fut,
        Fut: Future<Output = ()>,
    {
        debug!(key_count = keys.len(), limit = self.limit, "BoundedExecutor::for_each: called");
        if keys.is_empty() {
            return;
        }
        stream::iter(keys).for_each_concurrent(self.limit, task).await;
    }
}
