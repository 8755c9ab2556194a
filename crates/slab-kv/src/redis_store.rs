use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use slab_types::RuntimeError;
use std::time::Duration;
use tracing::warn;

use crate::KvStore;

/// Redis-backed [`KvStore`].
///
/// Uses [`ConnectionManager`], which transparently reconnects on transport
/// errors, so callers never have to manage a connection pool themselves.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, RuntimeError> {
        let client = redis::Client::open(url).map_err(|e| RuntimeError::KvUnavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| RuntimeError::KvUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn map_err(e: redis::RedisError) -> RuntimeError {
    RuntimeError::KvUnavailable(e.to_string())
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RuntimeError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_err)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), RuntimeError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(map_err),
            None => conn.set::<_, _, ()>(key, value).await.map_err(map_err),
        }
    }

    async fn setnx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, RuntimeError> {
        let mut conn = self.conn.clone();
        // SET key value NX EX ttl — atomic set-if-absent with expiry.
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl.as_secs().max(1) as usize));
        let result: Option<String> = redis::Cmd::set_options(key, value, opts)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(result.is_some())
    }

    async fn del(&self, key: &str) -> Result<(), RuntimeError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(map_err)
    }

    async fn incr(&self, key: &str) -> Result<i64, RuntimeError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await.map_err(map_err)
    }

    async fn rpush(&self, key: &str, value: Vec<u8>) -> Result<(), RuntimeError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await.map_err(map_err)
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, RuntimeError> {
        let mut conn = self.conn.clone();
        // BLPOP returns (key, value); redis-rs's typed helper drops the key.
        let result: Option<(String, Vec<u8>)> = conn
            .blpop(key, timeout.as_secs_f64())
            .await
            .map_err(map_err)?;
        Ok(result.map(|(_, v)| v))
    }

    async fn llen(&self, key: &str) -> Result<i64, RuntimeError> {
        let mut conn = self.conn.clone();
        conn.llen(key).await.map_err(map_err)
    }

    async fn exists(&self, key: &str) -> Result<bool, RuntimeError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(map_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), RuntimeError> {
        let mut conn = self.conn.clone();
        match conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(key, error = %e, "expire failed (key may not exist)");
                Ok(())
            }
        }
    }
}
