//! Brute-force cosine-similarity retrieval over the `vectors` table (spec §1
//! "Out of scope" names the embedding model and vector index as external;
//! this in-process index is the seam that calls through to whichever
//! embedder is configured and just linearly scans what's stored).

use async_trait::async_trait;
use slab_llm::{Embedder, RetrievalIndex, RetrievedChunk};
use slab_types::RuntimeError;
use std::sync::Arc;

use crate::db::{SqliteStore, VectorStore};

pub struct SqliteRetrievalIndex {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteRetrievalIndex {
    pub fn new(store: Arc<SqliteStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::MAX;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return f32::MAX;
    }
    1.0 - (dot / (norm_a * norm_b))
}

#[async_trait]
impl RetrievalIndex for SqliteRetrievalIndex {
    async fn query(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RuntimeError> {
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::Internal("embedder returned no vector for the query".to_string()))?;

        let rows = self.store.all_vectors().await.map_err(|e| RuntimeError::KvUnavailable(e.to_string()))?;

        let mut scored: Vec<RetrievedChunk> = rows
            .into_iter()
            .map(|row| RetrievedChunk {
                score: cosine_distance(&query_vec, &row.embedding),
                text: row.text,
                metadata: row.metadata,
            })
            .collect();
        scored.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_near_zero() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]) < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_near_one() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_dims_score_as_maximally_distant() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[1.0]), f32::MAX);
    }
}
