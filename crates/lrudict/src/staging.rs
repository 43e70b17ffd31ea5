//! Staging buffer for evicted pairs
//!
//! Evictions happen under the cache guard, but observers must only run after
//! the guard is released. Evicted pairs are parked here together with the
//! callback that was configured at eviction time, then handed to the
//! dispatcher as one batch. Pairs are staged even without a callback so that
//! their keys and values are dropped after the guard is released.

use crate::dispatch::{CallbackError, SharedCallback};
use std::panic::{self, AssertUnwindSafe};

/// One evicted pair waiting for delivery
pub(crate) struct StagedEviction<K, V> {
    callback: Option<SharedCallback<K, V>>,
    key: K,
    value: V,
}

impl<K, V> StagedEviction<K, V> {
    /// Whether anyone is waiting for this pair
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Hand the pair to its callback, turning errors and panics into a
    /// [`CallbackError`]. Without a callback the pair is just dropped.
    pub fn deliver(self) -> std::result::Result<(), CallbackError> {
        let StagedEviction {
            callback,
            key,
            value,
        } = self;
        let Some(callback) = callback else {
            return Ok(());
        };

        match panic::catch_unwind(AssertUnwindSafe(|| callback.on_evict(key, value))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CallbackError::failed(err)),
            Err(payload) => Err(CallbackError::panicked(payload)),
        }
    }
}

/// Ordered buffer of evictions produced by one guarded operation
pub(crate) struct StagingQueue<K, V> {
    pending: Vec<StagedEviction<K, V>>,
}

impl<K, V> StagingQueue<K, V> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Queue an evicted pair for `callback`, or for release only if there is none
    pub fn push(&mut self, callback: Option<SharedCallback<K, V>>, key: K, value: V) {
        self.pending.push(StagedEviction {
            callback,
            key,
            value,
        });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Move every queued pair out, in enqueue order, leaving the queue empty
    pub fn take(&mut self) -> Vec<StagedEviction<K, V>> {
        std::mem::take(&mut self.pending)
    }
}
