//! Single-value cache.
//!
//! Holds exactly one entry, refreshed in place by a background task. Readers
//! always get the current snapshot; the only time they wait is before any
//! value has ever been produced, and then only up to the wait timeout.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};
use warmcache_core::{clock, deep_copy, CacheOptions, CachePolicy, Loader, Result};

use crate::entry::{CacheEntry, LoadOutcome, RefreshTicket};
use crate::stats::{CacheStats, Counters};

/// A thread-safe cache for one value loaded from a slow source.
///
/// Cloning is cheap and every clone shares the same entry.
///
/// # Example
///
/// ```rust,ignore
/// let cache = DataCache::builder(|| async { fetch_settings().await })
///     .options(&CacheOptions::new().expiration_ms(30_000).wait_timeout_ms(200))
///     .build();
///
/// let settings = cache.get().await;
/// ```
pub struct DataCache<V> {
    inner: Arc<Inner<V>>,
}

struct Inner<V> {
    entry: CacheEntry<V>,
    loader: Arc<dyn Loader<V>>,
    policy: CachePolicy,
    counters: Counters,
}

impl<V> Clone for DataCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`DataCache`].
pub struct DataCacheBuilder<V> {
    loader: Arc<dyn Loader<V>>,
    policy: CachePolicy,
    initial: Option<V>,
}

impl<V> DataCacheBuilder<V>
where
    V: Send + Sync + 'static,
{
    /// Applies millisecond options, normalizing them.
    pub fn options(mut self, options: &CacheOptions) -> Self {
        self.policy = CachePolicy::from_options(options);
        self
    }

    /// Uses a hand-built policy, normalized the same way as options.
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy.normalized();
        self
    }

    /// Seeds the cache so the first readers never wait.
    ///
    /// The first `get` still triggers a background load.
    pub fn initial_value(mut self, value: V) -> Self {
        self.initial = Some(value);
        self
    }

    /// Builds the cache.
    pub fn build(self) -> DataCache<V> {
        let now = clock::now();
        let entry = match self.initial {
            Some(value) => CacheEntry::with_value(Some(value), now),
            None => CacheEntry::empty(now, None),
        };

        DataCache {
            inner: Arc::new(Inner {
                entry,
                loader: self.loader,
                policy: self.policy,
                counters: Counters::default(),
            }),
        }
    }
}

impl<V> DataCache<V>
where
    V: Send + Sync + 'static,
{
    /// Starts building a cache around `loader`.
    pub fn builder(loader: impl Loader<V> + 'static) -> DataCacheBuilder<V> {
        DataCacheBuilder {
            loader: Arc::new(loader),
            policy: CachePolicy::default(),
            initial: None,
        }
    }

    /// Creates a cache with no initial value.
    pub fn new(loader: impl Loader<V> + 'static, options: &CacheOptions) -> Self {
        Self::builder(loader).options(options).build()
    }

    /// Returns the cached value, starting a background refresh if one is due.
    ///
    /// Returns `None` if no value has been loaded yet (and the wait timeout
    /// ran out) or if the last tolerated failure left a placeholder.
    /// Loader errors are never returned; the policy absorbs them.
    pub async fn get(&self) -> Option<Arc<V>> {
        let now = clock::now();
        if let Some(ticket) = self.inner.entry.try_start_refresh(now, &self.inner.policy) {
            self.inner.spawn_refresh(ticket);
        }

        self.inner.entry.wait_for_first_value().await;
        self.inner.entry.value()
    }

    /// Returns an independent copy of the cached value.
    pub async fn get_copy(&self) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned,
    {
        let value = self.get().await;
        value.as_deref().map(deep_copy).transpose()
    }

    /// The normalized policy this cache runs on.
    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot(1)
    }
}

impl<V> Inner<V>
where
    V: Send + Sync + 'static,
{
    fn spawn_refresh(self: &Arc<Self>, ticket: RefreshTicket) {
        self.counters.load_started();
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            debug!(ticket = ticket.number(), "refreshing cached value");
            let outcome = match inner.loader.load().await {
                Ok(value) => LoadOutcome::Loaded(Some(value)),
                Err(err) => {
                    let err = inner.counters.load_failed(err);
                    warn!(
                        error = %err,
                        cached = inner.policy.expiration_on_err.is_some(),
                        "cache load failed"
                    );
                    LoadOutcome::Failed
                }
            };

            let applied = inner.entry.apply(ticket, outcome, &inner.policy);
            trace!(ticket = ticket.number(), ?applied, "refresh finished");
        });
    }
}
