//! Cache entry and the refresh protocol shared by both engines.
//!
//! An entry owns a snapshot of the current value plus the deadlines that
//! drive refreshing. Its lock guards only that state and is never held
//! across an await, so loader I/O always runs with no lock held.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use warmcache_core::clock::{self, Instant};
use warmcache_core::CachePolicy;

/// Permission to run one refresh, handed out by the single-flight gate.
///
/// Tickets are numbered in issue order so an older load that finishes late
/// cannot overwrite the result of a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct RefreshTicket(u64);

impl RefreshTicket {
    pub(crate) fn number(self) -> u64 {
        self.0
    }
}

/// What a background load produced.
pub(crate) enum LoadOutcome<V> {
    /// The loader succeeded; `None` means the source had nothing for this entry.
    Loaded(Option<V>),
    /// The loader failed.
    Failed,
}

/// What `apply` did with a load outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Applied {
    /// The value was replaced and the next refresh scheduled.
    Stored,
    /// A failure that the policy does not cache; the entry is untouched.
    Discarded,
    /// A newer refresh already landed.
    Superseded,
}

struct EntryState<V> {
    value: Option<Arc<V>>,
    next_refresh_at: Instant,
    /// `None` until someone first waits for data.
    first_load_cutoff: Option<Instant>,
    issued: u64,
    applied: u64,
}

pub(crate) struct CacheEntry<V> {
    state: RwLock<EntryState<V>>,
    ready: watch::Sender<bool>,
}

impl<V> CacheEntry<V> {
    /// An entry with no data, due for refresh immediately.
    ///
    /// `first_load_cutoff` bounds how long readers wait for the first value;
    /// pass `None` to arm it when the first refresh starts.
    pub(crate) fn empty(now: Instant, first_load_cutoff: Option<Instant>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            state: RwLock::new(EntryState {
                value: None,
                next_refresh_at: now,
                first_load_cutoff,
                issued: 0,
                applied: 0,
            }),
            ready,
        }
    }

    /// An entry that already holds data but is still due for its first refresh.
    pub(crate) fn with_value(value: Option<V>, now: Instant) -> Self {
        let (ready, _) = watch::channel(true);
        Self {
            state: RwLock::new(EntryState {
                value: value.map(Arc::new),
                next_refresh_at: now,
                first_load_cutoff: Some(now),
                issued: 0,
                applied: 0,
            }),
            ready,
        }
    }

    /// Current snapshot. Never blocks on a refresh.
    pub(crate) fn value(&self) -> Option<Arc<V>> {
        self.state.read().value.clone()
    }

    /// True once any value, or a cached failure, has been stored.
    pub(crate) fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        now >= self.state.read().next_refresh_at
    }

    /// The single-flight gate.
    ///
    /// Exactly one caller per retry window gets a ticket and must launch the
    /// load. Winning also arms the first-load cutoff if nobody has yet.
    pub(crate) fn try_start_refresh(
        &self,
        now: Instant,
        policy: &CachePolicy,
    ) -> Option<RefreshTicket> {
        if !self.is_due(now) {
            return None;
        }

        let mut state = self.state.write();
        if now < state.next_refresh_at {
            return None;
        }
        state.next_refresh_at = now + policy.retry_interval;
        state.issued += 1;
        if state.first_load_cutoff.is_none() {
            state.first_load_cutoff = Some(now + policy.wait_timeout);
        }
        Some(RefreshTicket(state.issued))
    }

    /// Stores the result of the load started with `ticket`.
    pub(crate) fn apply(
        &self,
        ticket: RefreshTicket,
        outcome: LoadOutcome<V>,
        policy: &CachePolicy,
    ) -> Applied {
        let (value, expire) = match outcome {
            LoadOutcome::Loaded(value) => (value, policy.expiration),
            LoadOutcome::Failed => match policy.expiration_on_err {
                // Leave `next_refresh_at` as the gate set it: due again after the retry interval.
                None => return Applied::Discarded,
                Some(expire) => (None, expire),
            },
        };

        let now = clock::now();
        let mut state = self.state.write();
        if ticket.0 <= state.applied {
            return Applied::Superseded;
        }
        state.applied = ticket.0;
        state.value = value.map(Arc::new);
        state.next_refresh_at = now + expire;
        if state.first_load_cutoff.map_or(true, |cutoff| now < cutoff) {
            state.first_load_cutoff = Some(now);
        }
        self.ready.send_replace(true);
        Applied::Stored
    }

    /// Waits until the first value arrives or the first-load cutoff passes.
    ///
    /// Returns immediately once the entry has ever been filled.
    pub(crate) async fn wait_for_first_value(&self) {
        let cutoff = {
            let state = self.state.read();
            match state.first_load_cutoff {
                Some(cutoff) if !self.is_ready() => cutoff,
                _ => return,
            }
        };
        if clock::now() >= cutoff {
            return;
        }

        let mut ready = self.ready.subscribe();
        let _ = tokio::time::timeout_at(cutoff, ready.wait_for(|ready| *ready)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warmcache_core::CacheOptions;

    fn policy(expiration: i64, on_err: i64, retry: i64, wait: i64) -> CachePolicy {
        CachePolicy::from_options(
            &CacheOptions::new()
                .expiration_ms(expiration)
                .expiration_on_err_ms(on_err)
                .retry_interval_ms(retry)
                .wait_timeout_ms(wait),
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_admits_one_caller_per_retry_window() {
        let policy = policy(50, 0, 10, 0);
        let now = clock::now();
        let entry = CacheEntry::<u32>::empty(now, None);

        let first = entry.try_start_refresh(now, &policy);
        assert_eq!(first.map(RefreshTicket::number), Some(1));
        assert!(entry.try_start_refresh(now, &policy).is_none());
        assert!(entry.try_start_refresh(now + ms(9), &policy).is_none());

        let retry = entry.try_start_refresh(now + ms(10), &policy);
        assert_eq!(retry.map(RefreshTicket::number), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_schedules_next_refresh() {
        let policy = policy(50, 0, 10, 0);
        let entry = CacheEntry::empty(clock::now(), None);
        let ticket = entry.try_start_refresh(clock::now(), &policy).unwrap();

        assert_eq!(entry.apply(ticket, LoadOutcome::Loaded(Some(7)), &policy), Applied::Stored);
        assert_eq!(entry.value().as_deref(), Some(&7));
        assert!(entry.is_ready());
        assert!(!entry.is_due(clock::now() + ms(49)));
        assert!(entry.is_due(clock::now() + ms(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncached_failure_leaves_entry_due_after_retry() {
        let policy = policy(50, 0, 10, 0);
        let start = clock::now();
        let entry = CacheEntry::with_value(Some(3), start);
        let ticket = entry.try_start_refresh(start, &policy).unwrap();

        assert_eq!(entry.apply(ticket, LoadOutcome::Failed, &policy), Applied::Discarded);
        assert_eq!(entry.value().as_deref(), Some(&3));
        assert!(!entry.is_due(start + ms(9)));
        assert!(entry.is_due(start + ms(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_failure_stores_placeholder() {
        let policy = policy(50, 40, 10, 0);
        let entry = CacheEntry::with_value(Some(3), clock::now());
        let ticket = entry.try_start_refresh(clock::now(), &policy).unwrap();

        assert_eq!(entry.apply(ticket, LoadOutcome::Failed, &policy), Applied::Stored);
        assert_eq!(entry.value(), None);
        assert!(!entry.is_due(clock::now() + ms(39)));
        assert!(entry.is_due(clock::now() + ms(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_from_older_refresh_is_dropped() {
        let policy = policy(1000, 0, 10, 0);
        let start = clock::now();
        let entry = CacheEntry::empty(start, None);

        let old = entry.try_start_refresh(start, &policy).unwrap();
        let new = entry.try_start_refresh(start + ms(10), &policy).unwrap();
        assert!(old < new);

        assert_eq!(entry.apply(new, LoadOutcome::Loaded(Some("new")), &policy), Applied::Stored);
        assert_eq!(
            entry.apply(old, LoadOutcome::Loaded(Some("old")), &policy),
            Applied::Superseded
        );
        assert_eq!(entry.value().as_deref(), Some(&"new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_bounded_by_cutoff() {
        let policy = policy(50, 0, 10, 5);
        let start = clock::now();
        let entry = CacheEntry::<u32>::empty(start, None);
        entry.try_start_refresh(start, &policy).unwrap();

        entry.wait_for_first_value().await;
        assert_eq!(clock::now() - start, ms(5));
        assert_eq!(entry.value(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_released_by_first_value() {
        let policy = policy(50, 0, 10, 100);
        let start = clock::now();
        let entry = Arc::new(CacheEntry::empty(start, None));
        let ticket = entry.try_start_refresh(start, &policy).unwrap();

        let writer = Arc::clone(&entry);
        tokio::spawn(async move {
            tokio::time::sleep(ms(20)).await;
            writer.apply(ticket, LoadOutcome::Loaded(Some(1u32)), &policy);
        });

        entry.wait_for_first_value().await;
        assert_eq!(clock::now() - start, ms(20));
        assert_eq!(entry.value().as_deref(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unarmed_entry_does_not_wait() {
        let entry = CacheEntry::<u32>::empty(clock::now(), None);
        let start = clock::now();
        entry.wait_for_first_value().await;
        assert_eq!(clock::now(), start);
    }
}
