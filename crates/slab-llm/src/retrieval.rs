//! The document retrieval index (spec §1 "Out of scope"; spec §8 scenario 6
//! "Retrieval filter"). Lower `score` means closer; filtering against
//! `RAG_SCORE_MAX` is the chat orchestrator's job, not this trait's — the
//! index just returns its `k` nearest candidates.

use async_trait::async_trait;
use serde::Serialize;
use slab_types::RuntimeError;

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    async fn query(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RuntimeError>;
}

/// A fixed in-memory corpus, sorted by ascending score on construction.
/// Used in tests to exercise the orchestrator's `RAG_SCORE_MAX` filtering
/// without a real vector index.
pub struct StaticRetrievalIndex {
    chunks: Vec<RetrievedChunk>,
}

impl StaticRetrievalIndex {
    pub fn new(mut chunks: Vec<RetrievedChunk>) -> Self {
        chunks.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        Self { chunks }
    }
}

#[async_trait]
impl RetrievalIndex for StaticRetrievalIndex {
    async fn query(&self, _query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RuntimeError> {
        Ok(self.chunks.iter().take(k).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_at_most_k_chunks_sorted_by_score() {
        let index = StaticRetrievalIndex::new(vec![
            RetrievedChunk { text: "far".into(), score: 1.4, metadata: serde_json::json!({}) },
            RetrievedChunk { text: "near".into(), score: 0.5, metadata: serde_json::json!({}) },
        ]);
        let result = index.query("q", 1).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "near");
    }
}
