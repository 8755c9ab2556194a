//! C7 — session context cache.
//!
//! Fast reads for the prompt assembler, bounded growth via a rolling window
//! and a re-summarization hand-off to the task broker (spec §4.7).
//!
//! The persistent store (behind [`SessionPersistence`]) is authoritative;
//! this cache may lag by one turn under concurrent writes to the same
//! session — see `DESIGN.md` Open Question 2. No lock is taken around the
//! cache read-modify-write in [`SessionCache::append`].

use async_trait::async_trait;
use slab_broker::TaskBroker;
use slab_kv::{KvJsonExt, KvStore};
use slab_types::config::{task_name, RESUMMARIZE_THRESHOLD, T_CTX};
use slab_types::{ChatTurn, RuntimeError, SessionContext};
use std::sync::Arc;
use tracing::debug;

fn context_key(session_id: &str) -> String {
    format!("session:{session_id}:context")
}

/// The persistent store behind the cache. Implemented against sqlx in the
/// Master binary; a session's durable summary and message history live
/// there, not in the KV store.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load_summary(&self, session_id: &str) -> Result<Option<String>, RuntimeError>;

    /// The most recent `limit` messages, oldest-first.
    async fn load_recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>, RuntimeError>;
}

pub struct SessionCache {
    kv: Arc<dyn KvStore>,
    persistence: Arc<dyn SessionPersistence>,
    broker: TaskBroker,
}

impl SessionCache {
    pub fn new(kv: Arc<dyn KvStore>, persistence: Arc<dyn SessionPersistence>, broker: TaskBroker) -> Self {
        Self { kv, persistence, broker }
    }

    /// Read the cache, refilling from the persistent store on a miss
    /// (spec §4.7 "Load").
    pub async fn load(&self, session_id: &str) -> Result<SessionContext, RuntimeError> {
        if let Some(ctx) = self.kv.get_json::<SessionContext>(&context_key(session_id)).await? {
            return Ok(ctx);
        }
        let summary = self.persistence.load_summary(session_id).await?;
        let messages = self.persistence.load_recent_messages(session_id, slab_types::config::N_WINDOW).await?;
        let ctx = SessionContext::new(summary, messages);
        self.kv.set_json(&context_key(session_id), &ctx, Some(T_CTX)).await?;
        Ok(ctx)
    }

    /// Append a completed turn, evicting the oldest pair into a re-summary
    /// task once the window exceeds `RESUMMARIZE_THRESHOLD` (spec §4.7
    /// "Append"). Called by the chat persistence task, not directly by HTTP
    /// handlers.
    pub async fn append(
        &self,
        session_id: &str,
        user_turn: ChatTurn,
        assistant_turn: ChatTurn,
    ) -> Result<(), RuntimeError> {
        let mut ctx = self
            .kv
            .get_json::<SessionContext>(&context_key(session_id))
            .await?
            .unwrap_or_default();

        ctx.messages.push(user_turn);
        ctx.messages.push(assistant_turn);

        if ctx.messages.len() >= RESUMMARIZE_THRESHOLD {
            let oldest_two: Vec<ChatTurn> = ctx.messages.drain(0..2).collect();
            debug!(session_id, "window exceeded, submitting re-summary task");
            self.broker
                .submit(
                    task_name::UPDATE_SUMMARY,
                    serde_json::json!({
                        "session_id": session_id,
                        "current_summary": ctx.summary,
                        "oldest_two": oldest_two,
                    }),
                )
                .await?;
        }

        self.kv.set_json(&context_key(session_id), &ctx, Some(T_CTX)).await
    }

    /// Apply the result of a completed re-summary task: update the cache's
    /// `summary` field if present, leave it untouched on failure (spec §4.7
    /// "Re-summary task").
    pub async fn apply_new_summary(&self, session_id: &str, new_summary: String) -> Result<(), RuntimeError> {
        let mut ctx = self
            .kv
            .get_json::<SessionContext>(&context_key(session_id))
            .await?
            .unwrap_or_default();
        ctx.summary = Some(new_summary);
        self.kv.set_json(&context_key(session_id), &ctx, Some(T_CTX)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slab_kv::InMemoryStore;
    use slab_types::Role;

    struct FakePersistence {
        summary: Option<String>,
        messages: Vec<ChatTurn>,
    }

    #[async_trait]
    impl SessionPersistence for FakePersistence {
        async fn load_summary(&self, _session_id: &str) -> Result<Option<String>, RuntimeError> {
            Ok(self.summary.clone())
        }
        async fn load_recent_messages(&self, _session_id: &str, limit: usize) -> Result<Vec<ChatTurn>, RuntimeError> {
            let start = self.messages.len().saturating_sub(limit);
            Ok(self.messages[start..].to_vec())
        }
    }

    fn cache_with(persistence: FakePersistence) -> SessionCache {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let broker = TaskBroker::new(kv.clone());
        SessionCache::new(kv, Arc::new(persistence), broker)
    }

    #[tokio::test]
    async fn load_refills_from_persistence_on_miss() {
        let cache = cache_with(FakePersistence {
            summary: Some("prior summary".into()),
            messages: vec![ChatTurn { role: Role::User, content: "hi".into() }],
        });
        let ctx = cache.load("s1").await.unwrap();
        assert_eq!(ctx.summary.as_deref(), Some("prior summary"));
        assert_eq!(ctx.messages.len(), 1);
    }

    #[tokio::test]
    async fn load_hits_cache_on_second_call_without_touching_persistence() {
        let cache = cache_with(FakePersistence { summary: None, messages: vec![] });
        cache.load("s1").await.unwrap();
        cache
            .append(
                "s1",
                ChatTurn { role: Role::User, content: "q".into() },
                ChatTurn { role: Role::Assistant, content: "a".into() },
            )
            .await
            .unwrap();
        let ctx = cache.load("s1").await.unwrap();
        assert_eq!(ctx.messages.len(), 2);
    }

    #[tokio::test]
    async fn append_triggers_resummary_and_evicts_oldest_pair_at_threshold() {
        let cache = cache_with(FakePersistence { summary: None, messages: vec![] });
        for i in 0..4 {
            cache
                .append(
                    "s1",
                    ChatTurn { role: Role::User, content: format!("q{i}") },
                    ChatTurn { role: Role::Assistant, content: format!("a{i}") },
                )
                .await
                .unwrap();
        }
        // 8 messages cached so far, below threshold.
        let ctx = cache.load("s1").await.unwrap();
        assert_eq!(ctx.messages.len(), 8);

        // 5th turn pushes the count to 10, crossing RESUMMARIZE_THRESHOLD.
        cache
            .append(
                "s1",
                ChatTurn { role: Role::User, content: "q4".into() },
                ChatTurn { role: Role::Assistant, content: "a4".into() },
            )
            .await
            .unwrap();
        let ctx = cache.load("s1").await.unwrap();
        assert_eq!(ctx.messages.len(), 8);
        assert_eq!(ctx.messages[0].content, "q1");

        let envelope = cache
            .broker
            .receive(slab_types::config::Q_DEFAULT, std::time::Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.name, task_name::UPDATE_SUMMARY);
        assert_eq!(envelope.payload["session_id"], "s1");
    }

    #[tokio::test]
    async fn apply_new_summary_updates_cached_summary_only() {
        let cache = cache_with(FakePersistence { summary: None, messages: vec![] });
        cache.load("s1").await.unwrap();
        cache.apply_new_summary("s1", "fused summary".into()).await.unwrap();
        let ctx = cache.load("s1").await.unwrap();
        assert_eq!(ctx.summary.as_deref(), Some("fused summary"));
    }
}
