//! The storage interface consumed by the lease protocol.

use async_trait::async_trait;

use crate::error::StoreError;

/// Durable key-value store with an advisory per-key lock.
///
/// Values are opaque strings. An absent key and an empty value both mean the
/// slot is free; callers must treat them identically.
///
/// The lock is advisory: it only excludes other callers of [`lock`](Self::lock)
/// on the same key. Reads and writes do not take it implicitly. The lock is
/// held for as long as the returned guard lives.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Guard that holds a key's lock until dropped.
    type Guard: Send + 'static;

    /// Read the value stored at `key`, or `None` if absent.
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` at `key`, replacing any previous value.
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Block until the advisory lock for `key` is held.
    async fn lock(&self, key: &str) -> Result<Self::Guard, StoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: LeaseStore + ?Sized> LeaseStore for std::sync::Arc<T> {
    type Guard = T::Guard;

    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).write(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn lock(&self, key: &str) -> Result<Self::Guard, StoreError> {
        (**self).lock(key).await
    }
}
