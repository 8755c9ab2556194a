//! C2 — task broker.
//!
//! Submits named tasks to one of the three queues (spec §6 "Task queues")
//! and returns a fresh task id. Routing is static and total: every task
//! name maps to exactly one queue (spec §4.2).

use serde::{Deserialize, Serialize};
use slab_kv::{KvJsonExt, KvStore};
use slab_types::config::{task_name, Q_DEFAULT, Q_IMAGE, Q_STT};
use slab_types::RuntimeError;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// `{name, id, payload}`, JSON-encoded onto the queue list (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub name: String,
    pub id: String,
    pub payload: serde_json::Value,
}

/// Route a task name to its queue. Unknown names fall through to
/// `Q_DEFAULT`, matching "otherwise `Q_DEFAULT`" in spec §4.2.
pub fn route(name: &str) -> &'static str {
    match name {
        task_name::IMAGE_GEN => Q_IMAGE,
        task_name::TRANSCRIBE => Q_STT,
        _ => Q_DEFAULT,
    }
}

#[derive(Clone)]
pub struct TaskBroker {
    kv: Arc<dyn KvStore>,
}

impl TaskBroker {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Assign a fresh id, encode the envelope, and push it to the routed
    /// queue. Fails only on store unavailability (spec §4.2).
    pub async fn submit(&self, name: &str, payload: serde_json::Value) -> Result<String, RuntimeError> {
        let id = Uuid::new_v4().to_string();
        let envelope = TaskEnvelope { name: name.to_string(), id: id.clone(), payload };
        let queue = route(name);
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| RuntimeError::Internal(format!("encode envelope: {e}")))?;
        self.kv.rpush(queue, bytes).await?;
        Ok(id)
    }

    /// Re-push an already-minted envelope to its routed queue, preserving
    /// its id. Used to re-enqueue a task refused GPU admission, where
    /// `submit` would otherwise mint a new id and orphan the original one
    /// (spec §4.3, §5 "GPU acquire retry").
    pub async fn resubmit(&self, envelope: TaskEnvelope) -> Result<(), RuntimeError> {
        let queue = route(&envelope.name);
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| RuntimeError::Internal(format!("encode envelope: {e}")))?;
        self.kv.rpush(queue, bytes).await
    }

    /// Pop one envelope from `queue`, waiting up to `timeout`.
    ///
    /// Decoding errors are treated as poison: the entry is dropped and a
    /// warning logged, matching spec §4.2's receiver failure semantics,
    /// rather than propagated as an error.
    pub async fn receive(&self, queue: &str, timeout: Duration) -> Result<Option<TaskEnvelope>, RuntimeError> {
        let Some(bytes) = self.kv.blpop(queue, timeout).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<TaskEnvelope>(&bytes) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                warn!(queue, error = %e, "dropping poisoned task envelope");
                Ok(None)
            }
        }
    }

    /// Queue depth, used by the GPU arbiter to decide hand-offs.
    pub async fn queue_len(&self, queue: &str) -> Result<i64, RuntimeError> {
        self.kv.llen(queue).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slab_kv::InMemoryStore;

    #[test]
    fn routing_table_matches_spec() {
        assert_eq!(route(task_name::IMAGE_GEN), Q_IMAGE);
        assert_eq!(route(task_name::TRANSCRIBE), Q_STT);
        assert_eq!(route(task_name::INGEST), Q_DEFAULT);
        assert_eq!(route(task_name::SAVE_CHAT), Q_DEFAULT);
        assert_eq!(route(task_name::UPDATE_SUMMARY), Q_DEFAULT);
        assert_eq!(route(task_name::RELEASE_GPU_IF_IDLE), Q_DEFAULT);
        assert_eq!(route("whatever-unknown-name"), Q_DEFAULT);
    }

    #[tokio::test]
    async fn submit_then_receive_round_trips() {
        let broker = TaskBroker::new(Arc::new(InMemoryStore::new()));
        let id = broker.submit(task_name::IMAGE_GEN, serde_json::json!({"prompt": "A"})).await.unwrap();
        let envelope = broker.receive(Q_IMAGE, Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.name, task_name::IMAGE_GEN);
    }

    #[tokio::test]
    async fn receive_times_out_on_empty_queue() {
        let broker = TaskBroker::new(Arc::new(InMemoryStore::new()));
        let result = broker.receive(Q_DEFAULT, Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn resubmit_preserves_task_id() {
        let broker = TaskBroker::new(Arc::new(InMemoryStore::new()));
        let id = broker.submit(task_name::IMAGE_GEN, serde_json::json!({"prompt": "A"})).await.unwrap();
        let envelope = broker.receive(Q_IMAGE, Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(envelope.id, id);
        broker.resubmit(envelope).await.unwrap();
        let redelivered = broker.receive(Q_IMAGE, Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(redelivered.id, id);
    }

    #[tokio::test]
    async fn fifo_within_queue() {
        let broker = TaskBroker::new(Arc::new(InMemoryStore::new()));
        broker.submit(task_name::INGEST, serde_json::json!({"n": 1})).await.unwrap();
        broker.submit(task_name::INGEST, serde_json::json!({"n": 2})).await.unwrap();
        let first = broker.receive(Q_DEFAULT, Duration::from_millis(20)).await.unwrap().unwrap();
        let second = broker.receive(Q_DEFAULT, Duration::from_millis(20)).await.unwrap().unwrap();
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 2);
    }
}
