use async_trait::async_trait;
use slab_types::RuntimeError;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

use crate::KvStore;

enum Entry {
    Scalar(Vec<u8>),
    List(VecDeque<Vec<u8>>),
}

struct Slot {
    entry: Entry,
    expires_at: Option<Instant>,
}

/// In-process [`KvStore`] used by unit tests and by local dev wiring.
///
/// Not shared across processes — has none of `RedisStore`'s cross-node
/// guarantees. `blpop` is implemented with a per-key [`Notify`] so a pusher
/// wakes exactly the waiters that were already blocked, same as a real
/// blocking list pop.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    notify: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn notifier(&self, key: &str) -> Arc<Notify> {
        let mut map = self.notify.lock().await;
        map.entry(key.to_string()).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    fn is_live(slot: &Slot) -> bool {
        match slot.expires_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RuntimeError> {
        let slots = self.slots.lock().await;
        Ok(slots.get(key).filter(|s| Self::is_live(s)).and_then(|s| match &s.entry {
            Entry::Scalar(v) => Some(v.clone()),
            Entry::List(_) => None,
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), RuntimeError> {
        let mut slots = self.slots.lock().await;
        slots.insert(
            key.to_string(),
            Slot { entry: Entry::Scalar(value), expires_at: ttl.map(|d| Instant::now() + d) },
        );
        Ok(())
    }

    async fn setnx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, RuntimeError> {
        let mut slots = self.slots.lock().await;
        if slots.get(key).is_some_and(Self::is_live) {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot { entry: Entry::Scalar(value), expires_at: Some(Instant::now() + ttl) },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<(), RuntimeError> {
        self.slots.lock().await.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, RuntimeError> {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::Scalar(b"0".to_vec()),
            expires_at: None,
        });
        let current = match &slot.entry {
            Entry::Scalar(v) => std::str::from_utf8(v).ok().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0),
            Entry::List(_) => 0,
        };
        let next = current + 1;
        slot.entry = Entry::Scalar(next.to_string().into_bytes());
        Ok(next)
    }

    async fn rpush(&self, key: &str, value: Vec<u8>) -> Result<(), RuntimeError> {
        {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
                entry: Entry::List(VecDeque::new()),
                expires_at: None,
            });
            match &mut slot.entry {
                Entry::List(list) => list.push_back(value),
                Entry::Scalar(_) => {
                    slot.entry = Entry::List(VecDeque::from([value]));
                }
            }
        }
        self.notifier(key).await.notify_waiters();
        Ok(())
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>, RuntimeError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut slots = self.slots.lock().await;
                if let Some(slot) = slots.get_mut(key) {
                    if let Entry::List(list) = &mut slot.entry {
                        if let Some(v) = list.pop_front() {
                            return Ok(Some(v));
                        }
                    }
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let notify = self.notifier(key).await;
            let _ = tokio::time::timeout(remaining, notify.notified()).await;
        }
    }

    async fn llen(&self, key: &str) -> Result<i64, RuntimeError> {
        let slots = self.slots.lock().await;
        Ok(match slots.get(key).map(|s| &s.entry) {
            Some(Entry::List(list)) => list.len() as i64,
            _ => 0,
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, RuntimeError> {
        let slots = self.slots.lock().await;
        Ok(slots.get(key).is_some_and(Self::is_live))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), RuntimeError> {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(key) {
            slot.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setnx_refuses_when_present() {
        let kv = InMemoryStore::new();
        assert!(kv.setnx("k", b"a".to_vec(), Duration::from_secs(1)).await.unwrap());
        assert!(!kv.setnx("k", b"b".to_vec(), Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn blpop_returns_none_on_timeout() {
        let kv = InMemoryStore::new();
        let v = kv.blpop("empty", Duration::from_millis(20)).await.unwrap();
        assert!(v.is_none());
    }

    #[tokio::test]
    async fn blpop_wakes_on_push() {
        let kv = InMemoryStore::new();
        let kv2 = kv.clone();
        let handle = tokio::spawn(async move { kv2.blpop("q", Duration::from_secs(2)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        kv.rpush("q", b"hello".to_vec()).await.unwrap();
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let kv = InMemoryStore::new();
        kv.rpush("q", b"1".to_vec()).await.unwrap();
        kv.rpush("q", b"2".to_vec()).await.unwrap();
        assert_eq!(kv.blpop("q", Duration::from_millis(10)).await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.blpop("q", Duration::from_millis(10)).await.unwrap(), Some(b"2".to_vec()));
    }
}
