//! C1 — keyed store client.
//!
//! A thin contract over a keyed store with TTL, list push/pop with timeout,
//! an atomic counter, and set-if-absent. Backs task queues, progress
//! records, the session context cache, the per-session stream buffer, and
//! the `stop` control flag (spec §4.1).
//!
//! All values are byte strings; structured payloads are JSON-encoded by
//! callers via [`KvJsonExt`]. No operation blocks longer than its `timeout`.
//! [`KvStore::blpop`] returning `Ok(None)` after the timeout elapses is not
//! an error — callers loop on it (see `slab-stream`, `slab-broker`).

mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use slab_types::RuntimeError;
use std::time::Duration;

#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RuntimeError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), RuntimeError>;

    /// Set only if absent; returns `true` if the value was written.
    async fn setnx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, RuntimeError>;

    async fn del(&self, key: &str) -> Result<(), RuntimeError>;

    /// Atomically increment the integer stored at `key` (0 if absent) and
    /// return the new value.
    async fn incr(&self, key: &str) -> Result<i64, RuntimeError>;

    async fn rpush(&self, key: &str, value: Vec<u8>) -> Result<(), RuntimeError>;

    /// Pop the head of the list at `key`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` if the timeout elapses with nothing to pop; this
    /// is the expected common case in a drain loop, not an error.
    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, RuntimeError>;

    async fn llen(&self, key: &str) -> Result<i64, RuntimeError>;

    async fn exists(&self, key: &str) -> Result<bool, RuntimeError>;

    /// Set (or refresh) a TTL on an existing key. No-op if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), RuntimeError>;
}

/// JSON convenience helpers layered over the byte-string [`KvStore`] contract.
#[async_trait]
pub trait KvJsonExt: KvStore {
    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RuntimeError> {
        match self.get(key).await? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| RuntimeError::KvDecode { key: key.to_string(), message: e.to_string() }),
        }
    }

    async fn set_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| RuntimeError::KvDecode { key: key.to_string(), message: e.to_string() })?;
        self.set(key, bytes, ttl).await
    }
}

impl<T: KvStore + ?Sized> KvJsonExt for T {}
