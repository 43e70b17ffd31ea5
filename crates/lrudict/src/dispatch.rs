//! Eviction callbacks and their delivery outside the cache guard

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::warn;

use crate::staging::StagedEviction;
use crate::stats::CacheStats;

/// Boxed error an eviction callback may return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of an eviction callback
pub type CallbackResult = std::result::Result<(), BoxError>;

/// Observer notified with each evicted `(key, value)` pair.
///
/// Callbacks run after the cache guard is released, so they may call back
/// into the cache (including inserting, which can evict again). Pairs evicted
/// by such a re-entrant call are delivered after the current invocation
/// returns, never nested inside it.
pub trait EvictionCallback<K, V>: Send + Sync {
    /// Called once per evicted pair; ownership of the pair moves to the observer
    fn on_evict(&self, key: K, value: V) -> CallbackResult;
}

impl<K, V, F> EvictionCallback<K, V> for F
where
    F: Fn(K, V) -> CallbackResult + Send + Sync,
{
    fn on_evict(&self, key: K, value: V) -> CallbackResult {
        self(key, value)
    }
}

/// Shared handle to a configured callback
pub type SharedCallback<K, V> = Arc<dyn EvictionCallback<K, V>>;

/// An eviction callback returned an error or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError {
    message: String,
    panicked: bool,
}

impl CallbackError {
    pub(crate) fn failed(err: BoxError) -> Self {
        Self {
            message: err.to_string(),
            panicked: false,
        }
    }

    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self {
            message,
            panicked: true,
        }
    }

    /// Error or panic message from the callback
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the callback panicked rather than returning an error
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "Eviction callback panicked: {}", self.message)
        } else {
            write!(f, "Eviction callback failed: {}", self.message)
        }
    }
}

impl std::error::Error for CallbackError {}

struct DrainState<K, V> {
    queue: RefCell<VecDeque<StagedEviction<K, V>>>,
    draining: Cell<bool>,
}

/// Serializes drains of staged evictions for one cache.
///
/// The lock is distinct from the mutation guard, so slow callbacks hold up
/// other drains but never readers or writers. It is re-entrant: a callback
/// that mutates the cache on the same thread appends to the active queue
/// instead of starting a second drain.
pub(crate) struct Dispatcher<K, V> {
    state: ReentrantMutex<DrainState<K, V>>,
}

impl<K, V> Dispatcher<K, V> {
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(DrainState {
                queue: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
            }),
        }
    }

    /// Deliver a batch in order. Failures are logged and counted, and the
    /// remaining pairs are still delivered.
    ///
    /// Must be called without holding the cache guard.
    pub fn dispatch(&self, batch: Vec<StagedEviction<K, V>>, stats: &CacheStats) {
        if batch.is_empty() {
            return;
        }
        if !batch.iter().any(StagedEviction::has_callback) {
            // nothing to notify; release the pairs here, outside the guard
            drop(batch);
            return;
        }

        let state = self.state.lock();
        state.queue.borrow_mut().extend(batch);
        if state.draining.get() {
            return;
        }

        state.draining.set(true);
        loop {
            let next = state.queue.borrow_mut().pop_front();
            let Some(staged) = next else {
                break;
            };
            if let Err(err) = staged.deliver() {
                stats.record_callback_failure();
                warn!(panicked = err.is_panic(), "{}", err);
            }
        }
        state.draining.set(false);
    }
}
