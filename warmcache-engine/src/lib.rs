//! Refresh-ahead caches for data that is slow to produce.
//!
//! - [`DataCache`] holds a single value.
//! - [`CacheMap`] holds one value per key, supports batch loading through
//!   [`CacheMap::get_many`], and evicts keys nobody has read recently.
//!
//! Both serve the last good value while a background task fetches a fresh
//! one. At most one refresh per entry is started per retry interval, and a
//! reader only waits when an entry has never held data.
//!
//! ## Example
//!
//! ```rust
//! use warmcache_engine::{CacheOptions, DataCache};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let options = CacheOptions::new().expiration_ms(1_000).wait_timeout_ms(100);
//! let cache = DataCache::<u32>::new(|| async { Ok::<_, std::io::Error>(42u32) }, &options);
//!
//! assert_eq!(cache.get().await.as_deref(), Some(&42));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

mod batch;
mod data_cache;
mod entry;
mod map;
mod stats;

pub use data_cache::{DataCache, DataCacheBuilder};
pub use map::{CacheMap, CacheMapBuilder};
pub use stats::CacheStats;

pub use warmcache_core::{
    BatchLoader, BoxError, CacheError, CacheOptions, CachePolicy, KeyLoader, Loader, Result,
};
