//! Loader traits.
//!
//! The engines never talk to a data source directly. They call one of these
//! interfaces from a background task, with no cache lock held. Any async
//! closure with the matching shape implements them, so callers can pass
//! either a closure or their own client type.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::BoxError;

// ═══════════════════════════════════════════════════════════════════════════════
// SINGLE VALUE
// ═══════════════════════════════════════════════════════════════════════════════

/// Loads the one value held by a single-value cache.
#[async_trait]
pub trait Loader<V>: Send + Sync {
    /// Fetches a fresh value from the source.
    async fn load(&self) -> Result<V, BoxError>;
}

#[async_trait]
impl<V, E, F, Fut> Loader<V> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
    V: Send + 'static,
{
    async fn load(&self) -> Result<V, BoxError> {
        (self)().await.map_err(Into::into)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYED
// ═══════════════════════════════════════════════════════════════════════════════

/// Loads the value for one key of a keyed cache.
#[async_trait]
pub trait KeyLoader<K, V>: Send + Sync {
    /// Fetches a fresh value for `key`.
    async fn load(&self, key: K) -> Result<V, BoxError>;
}

#[async_trait]
impl<K, V, E, F, Fut> KeyLoader<K, V> for F
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
    K: Send + 'static,
    V: Send + 'static,
{
    async fn load(&self, key: K) -> Result<V, BoxError> {
        (self)(key).await.map_err(Into::into)
    }
}

/// Loads many keys of a keyed cache in one round trip.
///
/// Keys missing from the returned map are cached as absent.
#[async_trait]
pub trait BatchLoader<K, V>: Send + Sync {
    /// Fetches fresh values for `keys`.
    async fn load_batch(&self, keys: Vec<K>) -> Result<HashMap<K, V>, BoxError>;
}

#[async_trait]
impl<K, V, E, F, Fut> BatchLoader<K, V> for F
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HashMap<K, V>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    async fn load_batch(&self, keys: Vec<K>) -> Result<HashMap<K, V>, BoxError> {
        (self)(keys).await.map_err(Into::into)
    }
}
