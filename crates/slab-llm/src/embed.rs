//! The embedding model (spec §1 "Out of scope" — the library itself is
//! external; this is the seam the ingest runner calls through).

use async_trait::async_trait;
use slab_types::RuntimeError;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RuntimeError>;
}

/// Fixed-width zero vectors. Stands in for a real embedding model in tests
/// and local wiring where no embedding backend is configured; the ingest
/// runner's vector-store write path is exercised without needing one.
pub struct ZeroEmbedder {
    dims: usize,
}

impl ZeroEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl Embedder for ZeroEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RuntimeError> {
        Ok(texts.iter().map(|_| vec![0.0_f32; self.dims]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_embedder_returns_one_vector_per_text() {
        let embedder = ZeroEmbedder::new(4);
        let out = embedder.embed(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], vec![0.0; 4]);
    }
}
