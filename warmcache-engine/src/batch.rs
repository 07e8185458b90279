//! Multi-key reads for [`CacheMap`].
//!
//! Every due key in one `get_many` call goes to the batch loader in a single
//! background load. Keys that are already being refreshed by someone else
//! are left alone, so a batch never duplicates a single-key load.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, warn};
use warmcache_core::clock;
use warmcache_core::BatchLoader;

use crate::entry::{LoadOutcome, RefreshTicket};
use crate::map::{CacheMap, MapInner, Slot};

type DueSlot<K, V> = (K, Arc<Slot<V>>, RefreshTicket);

impl<K, V> CacheMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Returns the cached value for each distinct key in `keys`.
    ///
    /// Keys due for refresh are loaded together in the background through the
    /// batch loader, or one by one through the key loader if there is no
    /// batch loader. Keys seen for the first time wait for their first load,
    /// each bounded by its own wait timeout. Absent keys map to `None`.
    pub async fn get_many(&self, keys: &[K]) -> HashMap<K, Option<Arc<V>>> {
        let inner = &self.inner;
        let now = clock::now();

        let mut seen = HashSet::with_capacity(keys.len());
        let mut slots = Vec::with_capacity(keys.len());
        let mut due: Vec<DueSlot<K, V>> = Vec::new();

        for key in keys {
            if !seen.insert(key) {
                continue;
            }
            let slot = inner.slot_or_insert(key, now);
            if let Some(ticket) = slot.entry.try_start_refresh(now, &inner.policy) {
                due.push((key.clone(), Arc::clone(&slot), ticket));
            }
            slots.push((key, slot));
        }

        if !due.is_empty() {
            match &inner.batch_loader {
                Some(loader) => inner.spawn_batch_refresh(Arc::clone(loader), due),
                None => {
                    for (key, slot, ticket) in due {
                        inner.spawn_refresh(key, slot, ticket);
                    }
                }
            }
        }

        let mut values = HashMap::with_capacity(slots.len());
        for (key, slot) in slots {
            slot.entry.wait_for_first_value().await;
            slot.touch(clock::now(), inner.policy.evict_timeout);
            values.insert(key.clone(), slot.entry.value());
        }
        values
    }
}

impl<K, V> MapInner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn spawn_batch_refresh(
        self: &Arc<Self>,
        loader: Arc<dyn BatchLoader<K, V>>,
        due: Vec<DueSlot<K, V>>,
    ) {
        self.counters.load_started();
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            let keys: Vec<K> = due.iter().map(|(key, _, _)| key.clone()).collect();
            debug!(keys = keys.len(), "batch refreshing cached keys");

            match loader.load_batch(keys).await {
                Ok(mut values) => {
                    for (key, slot, ticket) in due {
                        let outcome = LoadOutcome::Loaded(values.remove(&key));
                        slot.entry.apply(ticket, outcome, &inner.policy);
                    }
                }
                Err(err) => {
                    let err = inner.counters.load_failed(err);
                    warn!(
                        error = %err,
                        keys = due.len(),
                        cached = inner.policy.expiration_on_err.is_some(),
                        "cache batch load failed"
                    );
                    for (_, slot, ticket) in due {
                        slot.entry.apply(ticket, LoadOutcome::Failed, &inner.policy);
                    }
                }
            }
        });
    }
}
