//! Process-local lease store.
//!
//! Keeps every value in a `BTreeMap` and hands out one async mutex per key
//! for the advisory lock. Useful for tests and for bounding concurrency among
//! tasks of a single process.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::traits::LeaseStore;

/// A deterministic in-memory lease store.
///
/// Supports fault injection: keys registered with
/// [`inject_failure`](Self::inject_failure) fail every operation with
/// [`StoreError::Unavailable`] until cleared.
#[derive(Default)]
pub struct InMemoryLeaseStore {
    /// Stored values.
    data: RwLock<BTreeMap<String, String>>,
    /// One lock per key, created on first use.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Keys that currently fail all operations.
    failing: RwLock<HashSet<String>>,
}

impl InMemoryLeaseStore {
    /// Create a new empty store wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every operation on `key` fail until [`clear_failures`](Self::clear_failures).
    pub async fn inject_failure(&self, key: impl Into<String>) {
        self.failing.write().await.insert(key.into());
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    /// Snapshot of every stored key and value, in key order.
    pub async fn entries(&self) -> Vec<(String, String)> {
        self.data.read().await.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    async fn check_available(&self, key: &str) -> Result<(), StoreError> {
        if self.failing.read().await.contains(key) {
            return Err(StoreError::Unavailable { key: key.to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    type Guard = OwnedMutexGuard<()>;

    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available(key).await?;
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_available(key).await?;
        self.data.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available(key).await?;
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn lock(&self, key: &str) -> Result<Self::Guard, StoreError> {
        self.check_available(key).await?;
        let key_lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        Ok(key_lock.lock_owned().await)
    }
}
