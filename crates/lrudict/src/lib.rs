//! # lrudict
//!
//! Thread-safe, fixed-capacity LRU dictionary.
//!
//! ## Architecture
//! - **Key index**: AHash map from key to arena slot (O(1))
//! - **Recency list**: doubly-linked list over the same arena (O(1) promote/evict)
//! - **Guard**: one mutex per cache covering index, list and capacity
//! - **Eviction callbacks**: evicted pairs are staged under the guard and
//!   delivered after it is released, so callbacks may re-enter the cache
//!
//! ## Example
//!
//! ```rust
//! use lrudict::LruDict;
//!
//! let cache = LruDict::new(3).unwrap();
//! for i in 0..5 {
//!     cache.put(i, i.to_string());
//! }
//! assert_eq!(cache.keys().collect::<Vec<_>>(), vec![4, 3, 2]);
//! ```

#![warn(missing_docs)]

mod cache;
mod dispatch;
mod error;
mod lru;
mod staging;
mod stats;

pub use cache::{LruDict, LruDictBuilder, Order, Snapshot};
pub use dispatch::{BoxError, CallbackError, CallbackResult, EvictionCallback, SharedCallback};
pub use error::{Error, Result};
pub use stats::Stats;
