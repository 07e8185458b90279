//! Keyed cache map.
//!
//! Entries are created lazily on first access, refreshed independently, and
//! removed by a background sweep once nobody has touched them for the evict
//! timeout. The map's own locking only covers inserting and removing slots;
//! values are read and written under each entry's lock.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, trace, warn};
use warmcache_core::clock::{self, Instant};
use warmcache_core::{
    deep_copy, BatchLoader, BoxError, CacheError, CacheOptions, CachePolicy, KeyLoader, Result,
};

use crate::entry::{CacheEntry, LoadOutcome, RefreshTicket};
use crate::stats::{CacheStats, Counters};

/// One key's entry plus its idle deadline.
pub(crate) struct Slot<V> {
    pub(crate) entry: CacheEntry<V>,
    evict_at: Mutex<Instant>,
}

impl<V> Slot<V> {
    fn new(now: Instant, policy: &CachePolicy) -> Self {
        Self {
            entry: CacheEntry::empty(now, Some(now + policy.wait_timeout)),
            evict_at: Mutex::new(now + policy.evict_timeout),
        }
    }

    /// Pushes the idle deadline forward. Never moves it back.
    pub(crate) fn touch(&self, now: Instant, evict_timeout: std::time::Duration) {
        let mut evict_at = self.evict_at.lock();
        let next = now + evict_timeout;
        if next > *evict_at {
            *evict_at = next;
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        *self.evict_at.lock() < now
    }
}

/// A thread-safe map of independently refreshed entries.
///
/// Cloning is cheap and every clone shares the same entries. Must be built
/// inside a Tokio runtime: the idle sweep runs as a background task, which
/// stops once the last clone is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let users = CacheMap::builder()
///     .key_loader(|id: u64| async move { client.fetch_user(id).await })
///     .batch_loader(|ids: Vec<u64>| async move { client.fetch_users(&ids).await })
///     .options(&CacheOptions::new().expiration_ms(60_000).wait_timeout_ms(50))
///     .build()?;
///
/// let alice = users.get(&1).await;
/// let team = users.get_many(&[1, 2, 3]).await;
/// ```
pub struct CacheMap<K, V> {
    pub(crate) inner: Arc<MapInner<K, V>>,
}

pub(crate) struct MapInner<K, V> {
    slots: DashMap<K, Arc<Slot<V>>>,
    key_loader: Option<Arc<dyn KeyLoader<K, V>>>,
    pub(crate) batch_loader: Option<Arc<dyn BatchLoader<K, V>>>,
    pub(crate) policy: CachePolicy,
    pub(crate) counters: Counters,
}

impl<K, V> Clone for CacheMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`CacheMap`].
pub struct CacheMapBuilder<K, V> {
    key_loader: Option<Arc<dyn KeyLoader<K, V>>>,
    batch_loader: Option<Arc<dyn BatchLoader<K, V>>>,
    policy: CachePolicy,
}

impl<K, V> CacheMapBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Sets the loader used for single keys.
    pub fn key_loader(mut self, loader: impl KeyLoader<K, V> + 'static) -> Self {
        self.key_loader = Some(Arc::new(loader));
        self
    }

    /// Sets the loader used by `get_many`.
    ///
    /// Without one, `get_many` starts one single-key load per key.
    pub fn batch_loader(mut self, loader: impl BatchLoader<K, V> + 'static) -> Self {
        self.batch_loader = Some(Arc::new(loader));
        self
    }

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

    /// Builds the map and starts its idle sweep.
    pub fn build(self) -> Result<CacheMap<K, V>> {
        if self.key_loader.is_none() && self.batch_loader.is_none() {
            return Err(CacheError::MissingLoader);
        }
        Ok(self.start())
    }

    fn start(self) -> CacheMap<K, V> {
        let inner = Arc::new(MapInner {
            slots: DashMap::new(),
            key_loader: self.key_loader,
            batch_loader: self.batch_loader,
            policy: self.policy,
            counters: Counters::default(),
        });
        MapInner::spawn_sweeper(&inner);

        CacheMap { inner }
    }
}

impl<K, V> CacheMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Starts building a map.
    pub fn builder() -> CacheMapBuilder<K, V> {
        CacheMapBuilder {
            key_loader: None,
            batch_loader: None,
            policy: CachePolicy::default(),
        }
    }

    /// Creates a map that loads keys one at a time.
    pub fn new(loader: impl KeyLoader<K, V> + 'static, options: &CacheOptions) -> Self {
        Self::builder().key_loader(loader).options(options).start()
    }

    /// Returns the value cached for `key`, starting a background refresh if one is due.
    ///
    /// A key seen for the first time waits up to the wait timeout for its
    /// first load. Loader errors are never returned.
    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        let now = clock::now();
        let slot = self.inner.slot_or_insert(key, now);

        if let Some(ticket) = slot.entry.try_start_refresh(now, &self.inner.policy) {
            self.inner.spawn_refresh(key.clone(), Arc::clone(&slot), ticket);
        }

        slot.entry.wait_for_first_value().await;
        slot.touch(clock::now(), self.inner.policy.evict_timeout);
        slot.entry.value()
    }

    /// Returns an independent copy of the value cached for `key`.
    pub async fn get_copy(&self, key: &K) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned,
    {
        let value = self.get(key).await;
        value.as_deref().map(deep_copy).transpose()
    }

    /// Drops `key`'s entry. The next access starts from scratch.
    pub fn remove(&self, key: &K) -> bool {
        self.inner.slots.remove(key).is_some()
    }

    /// Removes every entry idle past the evict timeout.
    ///
    /// The background sweep calls this once per evict timeout.
    pub fn evict_expired(&self) -> usize {
        self.inner.evict_expired(clock::now())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    /// The normalized policy this map runs on.
    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot(self.inner.slots.len())
    }
}

impl<K, V> MapInner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Existing slot for `key`, or a fresh one inserted under the shard lock.
    pub(crate) fn slot_or_insert(&self, key: &K, now: Instant) -> Arc<Slot<V>> {
        if let Some(slot) = self.slots.get(key).map(|slot| Arc::clone(slot.value())) {
            return slot;
        }

        // Another caller may have inserted since the read above.
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new(now, &self.policy)));
        Arc::clone(slot.value())
    }

    async fn load_one(&self, key: K) -> std::result::Result<Option<V>, BoxError> {
        if let Some(loader) = &self.key_loader {
            return loader.load(key).await.map(Some);
        }
        match &self.batch_loader {
            Some(loader) => {
                let mut values = loader.load_batch(vec![key.clone()]).await?;
                Ok(values.remove(&key))
            }
            None => Err(CacheError::MissingLoader.into()),
        }
    }

    pub(crate) fn spawn_refresh(self: &Arc<Self>, key: K, slot: Arc<Slot<V>>, ticket: RefreshTicket) {
        self.counters.load_started();
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            trace!(ticket = ticket.number(), "refreshing cached key");
            let outcome = match inner.load_one(key).await {
                Ok(value) => LoadOutcome::Loaded(value),
                Err(err) => {
                    let err = inner.counters.load_failed(err);
                    warn!(
                        error = %err,
                        cached = inner.policy.expiration_on_err.is_some(),
                        "cache key load failed"
                    );
                    LoadOutcome::Failed
                }
            };

            let applied = slot.entry.apply(ticket, outcome, &inner.policy);
            trace!(ticket = ticket.number(), ?applied, "key refresh finished");
        });
    }

    /// Removes idle slots: snapshot under read locks, then remove each one
    /// that is still idle.
    #[instrument(level = "debug", skip_all)]
    fn evict_expired(&self, now: Instant) -> usize {
        let idle: Vec<K> = self
            .slots
            .iter()
            .filter(|slot| slot.value().is_idle(now))
            .map(|slot| slot.key().clone())
            .collect();

        let mut evicted = 0;
        for key in idle {
            if self.slots.remove_if(&key, |_, slot| slot.is_idle(now)).is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.counters.evicted(evicted);
            debug!(evicted, "evicted idle cache entries");
        }
        evicted
    }

    fn spawn_sweeper(inner: &Arc<Self>) {
        let period = inner.policy.evict_timeout;
        let weak: Weak<Self> = Arc::downgrade(inner);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(clock::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    trace!("cache map dropped, stopping sweep");
                    break;
                };
                inner.evict_expired(clock::now());
            }
        });
    }
}
