//! C5 — stream buffer.
//!
//! A per-session FIFO of [`StreamFrame`]s at `session:{id}:stream_queue`,
//! decoupling the chat orchestrator (producer, one per active turn) from the
//! SSE bridge (consumer, one per open HTTP connection) — a disconnect and
//! reconnect on the consumer side never loses tokens already produced
//! (spec §4.5).
//!
//! Cancellation is a separate flag at `session:{id}:stop`: the producer
//! polls it between tokens and, on seeing it set, stops generating and
//! pushes exactly one [`StreamFrame::Stopped`].

use slab_kv::KvStore;
use slab_types::config::{STOP_FLAG_TTL, STREAM_BUFFER_TRAILING_TTL, STREAM_IDLE_LIMIT};
use slab_types::{RuntimeError, StreamFrame};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

fn queue_key(session_id: &str) -> String {
    format!("session:{session_id}:stream_queue")
}

fn stop_key(session_id: &str) -> String {
    format!("session:{session_id}:stop")
}

/// Producer-side handle, held by the chat orchestrator for the lifetime of
/// one turn.
#[derive(Clone)]
pub struct StreamProducer {
    kv: Arc<dyn KvStore>,
    session_id: String,
}

impl StreamProducer {
    /// Begin a new turn: clear any frames left over from a prior turn so a
    /// reconnecting consumer never replays stale output (spec §4.5
    /// "producer contract").
    pub async fn start(kv: Arc<dyn KvStore>, session_id: impl Into<String>) -> Result<Self, RuntimeError> {
        let session_id = session_id.into();
        kv.del(&queue_key(&session_id)).await?;
        Ok(Self { kv, session_id })
    }

    async fn push(&self, frame: StreamFrame) -> Result<(), RuntimeError> {
        self.kv.rpush(&queue_key(&self.session_id), frame.encode().into_bytes()).await
    }

    pub async fn push_docs(&self, docs: serde_json::Value) -> Result<(), RuntimeError> {
        self.push(StreamFrame::Docs(docs)).await
    }

    pub async fn push_text(&self, token: impl Into<String>) -> Result<(), RuntimeError> {
        self.push(StreamFrame::Text(token.into())).await
    }

    /// Push the one terminal frame for this turn and set the trailing TTL
    /// so a slow consumer still has a window to drain it (spec §4.5).
    async fn finish(&self, frame: StreamFrame) -> Result<(), RuntimeError> {
        self.push(frame).await?;
        self.kv.expire(&queue_key(&self.session_id), STREAM_BUFFER_TRAILING_TTL).await
    }

    pub async fn finish_done(&self) -> Result<(), RuntimeError> {
        self.finish(StreamFrame::Done).await
    }

    /// Push `Stopped` and delete the `stop` flag (spec §4.5 "Cancellation").
    pub async fn finish_stopped(&self) -> Result<(), RuntimeError> {
        self.finish(StreamFrame::Stopped).await?;
        self.kv.del(&stop_key(&self.session_id)).await
    }

    pub async fn finish_error(&self, message: impl Into<String>) -> Result<(), RuntimeError> {
        self.finish(StreamFrame::Error(message.into())).await
    }

    /// Check the cancellation flag. The producer calls this between tokens;
    /// on `true` it should stop generating and call [`Self::finish_stopped`].
    pub async fn is_stop_requested(&self) -> Result<bool, RuntimeError> {
        self.kv.exists(&stop_key(&self.session_id)).await
    }
}

/// Request cancellation of an in-flight turn (spec §4.5 "Cancellation",
/// called from the `/chat/stop` handler).
pub async fn request_stop(kv: &dyn KvStore, session_id: &str) -> Result<(), RuntimeError> {
    kv.set(&stop_key(session_id), b"1".to_vec(), Some(STOP_FLAG_TTL)).await
}

/// Consumer-side drain result.
#[derive(Debug, Clone)]
pub enum DrainEvent {
    Frame(StreamFrame),
    /// No frame arrived within `STREAM_IDLE_LIMIT`; the caller should treat
    /// this as a stalled turn and close the connection (spec §4.5).
    Idle,
}

/// Consumer-side handle, held by the SSE bridge for the lifetime of one HTTP
/// connection. Safe to drop and recreate across a reconnect — it reads the
/// same queue from wherever the previous consumer left off.
pub struct StreamConsumer {
    kv: Arc<dyn KvStore>,
    session_id: String,
}

impl StreamConsumer {
    pub fn new(kv: Arc<dyn KvStore>, session_id: impl Into<String>) -> Self {
        Self { kv, session_id: session_id.into() }
    }

    /// Block for the next frame, up to `STREAM_IDLE_LIMIT`. Poisoned entries
    /// are dropped with a warning and the wait continues, matching the
    /// broker's failure semantics (spec §4.2) rather than surfacing a decode
    /// error to the HTTP client.
    pub async fn next(&self) -> Result<DrainEvent, RuntimeError> {
        self.next_with_timeout(STREAM_IDLE_LIMIT).await
    }

    async fn next_with_timeout(&self, timeout: Duration) -> Result<DrainEvent, RuntimeError> {
        loop {
            let raw = self.kv.blpop(&queue_key(&self.session_id), timeout).await?;
            let Some(bytes) = raw else {
                return Ok(DrainEvent::Idle);
            };
            let Ok(text) = std::str::from_utf8(&bytes) else {
                warn!(session_id = %self.session_id, "dropping non-utf8 stream frame");
                continue;
            };
            match StreamFrame::decode(text) {
                Some(frame) => return Ok(DrainEvent::Frame(frame)),
                None => {
                    warn!(session_id = %self.session_id, raw = text, "dropping undecodable stream frame");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slab_kv::InMemoryStore;

    #[tokio::test]
    async fn producer_start_clears_stale_frames() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        kv.rpush(&queue_key("s1"), b"TEXT:leftover".to_vec()).await.unwrap();
        let _producer = StreamProducer::start(kv.clone(), "s1").await.unwrap();
        assert_eq!(kv.llen(&queue_key("s1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn full_turn_round_trips_through_consumer() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let producer = StreamProducer::start(kv.clone(), "s1").await.unwrap();
        producer.push_docs(serde_json::json!([{"id": 1}])).await.unwrap();
        producer.push_text("hel").await.unwrap();
        producer.push_text("lo").await.unwrap();
        producer.finish_done().await.unwrap();

        let consumer = StreamConsumer::new(kv, "s1");
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
                DrainEvent::Idle => panic!("unexpected idle"),
            }
        }
        assert!(matches!(frames[0], StreamFrame::Docs(_)));
        assert!(matches!(&frames[1], StreamFrame::Text(t) if t == "hel"));
        assert!(matches!(&frames[2], StreamFrame::Text(t) if t == "lo"));
        assert!(matches!(frames[3], StreamFrame::Done));
    }

    #[tokio::test]
    async fn stop_flag_round_trips() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let producer = StreamProducer::start(kv.clone(), "s1").await.unwrap();
        assert!(!producer.is_stop_requested().await.unwrap());
        request_stop(kv.as_ref(), "s1").await.unwrap();
        assert!(producer.is_stop_requested().await.unwrap());
    }

    #[tokio::test]
    async fn idle_reported_when_nothing_arrives() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let consumer = StreamConsumer::new(kv, "idle-session");
        let event = consumer.next_with_timeout(Duration::from_millis(20)).await.unwrap();
        assert!(matches!(event, DrainEvent::Idle));
    }
}
