//! Simulated slow data source used by the demo and bench commands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warmcache_core::{BatchLoader, BoxError, KeyLoader, Loader};

/// One record served by the source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: u64,
    /// Source call number that produced this record
    pub version: u64,
}

#[derive(Debug)]
struct State {
    latency: Duration,
    fail_every: u64,
    calls: AtomicU64,
}

/// Cloneable handle to a source that sleeps for `latency` on every call and
/// fails every `fail_every`-th call (never, if zero).
#[derive(Clone, Debug)]
pub struct SlowSource {
    state: Arc<State>,
}

impl SlowSource {
    pub fn new(latency: Duration, fail_every: u64) -> Self {
        Self {
            state: Arc::new(State {
                latency,
                fail_every,
                calls: AtomicU64::new(0),
            }),
        }
    }

    /// Calls made so far, batch calls counted once.
    pub fn calls(&self) -> u64 {
        self.state.calls.load(Ordering::Relaxed)
    }

    async fn call(&self) -> Result<u64, BoxError> {
        let call = self.state.calls.fetch_add(1, Ordering::Relaxed) + 1;
        tokio::time::sleep(self.state.latency).await;

        if self.state.fail_every > 0 && call % self.state.fail_every == 0 {
            return Err(anyhow!("simulated source failure on call {call}").into());
        }
        Ok(call)
    }
}

#[async_trait]
impl Loader<Record> for SlowSource {
    async fn load(&self) -> Result<Record, BoxError> {
        let version = self.call().await?;
        Ok(Record { key: 0, version })
    }
}

#[async_trait]
impl KeyLoader<u64, Record> for SlowSource {
    async fn load(&self, key: u64) -> Result<Record, BoxError> {
        let version = self.call().await?;
        Ok(Record { key, version })
    }
}

#[async_trait]
impl BatchLoader<u64, Record> for SlowSource {
    async fn load_batch(&self, keys: Vec<u64>) -> Result<HashMap<u64, Record>, BoxError> {
        let version = self.call().await?;
        Ok(keys
            .into_iter()
            .map(|key| (key, Record { key, version }))
            .collect())
    }
}
