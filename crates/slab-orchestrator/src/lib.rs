//! C6 — chat orchestrator.
//!
//! Per request: retrieve, assemble the prompt, spawn an async producer that
//! streams tokens into the session's stream buffer, and on natural
//! completion hand the finished turn off to the `save-chat` persistence
//! task (spec §4.6).

use futures::StreamExt;
use slab_broker::TaskBroker;
use slab_kv::KvStore;
use slab_llm::{LlmClient, RetrievalIndex};
use slab_stream::StreamProducer;
use slab_types::config::{task_name, LLM_POLL_MAX, RAG_K, RAG_SCORE_MAX};
use slab_types::RuntimeError;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ChatOrchestrator {
    kv: Arc<dyn KvStore>,
    broker: TaskBroker,
    retrieval: Arc<dyn RetrievalIndex>,
    llm: Arc<dyn LlmClient>,
}

impl ChatOrchestrator {
    pub fn new(
        kv: Arc<dyn KvStore>,
        broker: TaskBroker,
        retrieval: Arc<dyn RetrievalIndex>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self { kv, broker, retrieval, llm }
    }

    /// Start a turn. Returns once the producer has been handed off to a
    /// background task — the caller opens the HTTP streaming response
    /// immediately and drains via a [`slab_stream::StreamConsumer`] on the
    /// same session (spec §4.6 step 3).
    pub fn start_turn(&self, session_id: String, user_msg: String) {
        let kv = self.kv.clone();
        let broker = self.broker.clone();
        let retrieval = self.retrieval.clone();
        let llm = self.llm.clone();
        tokio::spawn(async move {
            if let Err(e) = run_turn(kv, broker, retrieval, llm, session_id.clone(), user_msg).await {
                warn!(session_id, error = %e, "chat turn aborted before a terminal frame was pushed");
            }
        });
    }
}

async fn run_turn(
    kv: Arc<dyn KvStore>,
    broker: TaskBroker,
    retrieval: Arc<dyn RetrievalIndex>,
    llm: Arc<dyn LlmClient>,
    session_id: String,
    user_msg: String,
) -> Result<(), RuntimeError> {
    let producer = StreamProducer::start(kv, &session_id).await?;

    let chunks: Vec<_> = retrieval
        .query(&user_msg, RAG_K)
        .await?
        .into_iter()
        .filter(|c| c.score <= RAG_SCORE_MAX)
        .collect();

    if !chunks.is_empty() {
        let payload = serde_json::to_value(&chunks)
            .map_err(|e| RuntimeError::Internal(format!("encode retrieval chunks: {e}")))?;
        producer.push_docs(payload).await?;
    }

    let prompt = if chunks.is_empty() {
        user_msg.clone()
    } else {
        let joined = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");
        format!("[context]\n{joined}\n[question]\n{user_msg}")
    };

    let mut stream = match tokio::time::timeout(LLM_POLL_MAX, llm.stream(None, &prompt)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            producer.finish_error(e.to_string()).await?;
            return Ok(());
        }
        Err(_) => {
            producer.finish_error("llm backend timed out".to_string()).await?;
            return Ok(());
        }
    };

    let mut ai_msg = String::new();
    loop {
        if producer.is_stop_requested().await? {
            producer.finish_stopped().await?;
            return Ok(());
        }
        match stream.next().await {
            Some(Ok(token)) => {
                ai_msg.push_str(&token);
                producer.push_text(token).await?;
            }
            Some(Err(e)) => {
                producer.finish_error(e.to_string()).await?;
                return Ok(());
            }
            None => break,
        }
    }

    producer.finish_done().await?;
    info!(session_id, len = ai_msg.len(), "chat turn completed, submitting persistence task");
    broker
        .submit(
            task_name::SAVE_CHAT,
            serde_json::json!({
                "session_id": session_id,
                "user_msg": user_msg,
                "ai_msg": ai_msg,
                "chunks": chunks,
            }),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use slab_kv::InMemoryStore;
    use slab_llm::{RetrievalIndex, RetrievedChunk};
    use slab_stream::{request_stop, DrainEvent, StreamConsumer};
    use slab_types::config::Q_DEFAULT;

    struct EmptyRetrieval;
    #[async_trait]
    impl RetrievalIndex for EmptyRetrieval {
        async fn query(&self, _q: &str, _k: usize) -> Result<Vec<RetrievedChunk>, RuntimeError> {
            Ok(vec![])
        }
    }

    struct FixedRetrieval(Vec<RetrievedChunk>);
    #[async_trait]
    impl RetrievalIndex for FixedRetrieval {
        async fn query(&self, _q: &str, k: usize) -> Result<Vec<RetrievedChunk>, RuntimeError> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct ScriptedLlm(Vec<&'static str>);
    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _s: Option<&str>, _p: &str) -> Result<String, RuntimeError> {
            Ok(self.0.concat())
        }
        async fn stream(
            &self,
            _s: Option<&str>,
            _p: &str,
        ) -> Result<BoxStream<'static, Result<String, RuntimeError>>, RuntimeError> {
            let items: Vec<Result<String, RuntimeError>> = self.0.iter().map(|t| Ok(t.to_string())).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    async fn drain_until_terminal(consumer: &StreamConsumer) -> Vec<slab_types::StreamFrame> {
        let mut frames = Vec::new();
        loop {
            match consumer.next().await.unwrap() {
                DrainEvent::Frame(f) => {
                    let terminal = f.is_terminal();
                    frames.push(f);
                    if terminal {
                        break;
                    }
                }
                DrainEvent::Idle => panic!("idle before a terminal frame"),
            }
        }
        frames
    }

    #[tokio::test]
    async fn full_turn_streams_tokens_and_submits_persistence_task() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let broker = TaskBroker::new(kv.clone());
        let orchestrator = ChatOrchestrator::new(
            kv.clone(),
            broker.clone(),
            Arc::new(EmptyRetrieval),
            Arc::new(ScriptedLlm(vec!["hel", "lo"])),
        );
        orchestrator.start_turn("s1".to_string(), "hi".to_string());

        let consumer = StreamConsumer::new(kv, "s1");
        let frames = drain_until_terminal(&consumer).await;
        assert!(matches!(frames.last().unwrap(), slab_types::StreamFrame::Done));

        let envelope = broker.receive(Q_DEFAULT, std::time::Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(envelope.name, task_name::SAVE_CHAT);
        assert_eq!(envelope.payload["ai_msg"], "hello");
    }

    #[tokio::test]
    async fn retrieval_filters_by_score_threshold() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let broker = TaskBroker::new(kv.clone());
        let chunks = vec![
            RetrievedChunk { text: "near".into(), score: 0.5, metadata: serde_json::json!({}) },
            RetrievedChunk { text: "far".into(), score: 1.4, metadata: serde_json::json!({}) },
        ];
        let orchestrator = ChatOrchestrator::new(
            kv.clone(),
            broker,
            Arc::new(FixedRetrieval(chunks)),
            Arc::new(ScriptedLlm(vec!["ok"])),
        );
        orchestrator.start_turn("s2".to_string(), "q".to_string());

        let consumer = StreamConsumer::new(kv, "s2");
        let frames = drain_until_terminal(&consumer).await;
        let docs = frames
            .iter()
            .find_map(|f| match f {
                slab_types::StreamFrame::Docs(v) => Some(v.clone()),
                _ => None,
            })
            .expect("a Docs frame");
        assert_eq!(docs.as_array().unwrap().len(), 1);
        assert_eq!(docs[0]["text"], "near");
    }

    #[tokio::test]
    async fn cancellation_stops_without_persisting() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let broker = TaskBroker::new(kv.clone());
        request_stop(kv.as_ref(), "s3").await.unwrap();
        let orchestrator = ChatOrchestrator::new(
            kv.clone(),
            broker.clone(),
            Arc::new(EmptyRetrieval),
            Arc::new(ScriptedLlm(vec!["never", "seen"])),
        );
        orchestrator.start_turn("s3".to_string(), "hi".to_string());

        let consumer = StreamConsumer::new(kv, "s3");
        let frames = drain_until_terminal(&consumer).await;
        assert!(matches!(frames.last().unwrap(), slab_types::StreamFrame::Stopped));

        let envelope = broker.receive(Q_DEFAULT, std::time::Duration::from_millis(50)).await.unwrap();
        assert!(envelope.is_none());
    }
}
