//! Ingest runner (spec §4.8 "Ingest runner"). Not GPU-bound.

use crate::harness::PipelineRunner;
use crate::master_client::MasterClient;
use async_trait::async_trait;
use serde::Deserialize;
use slab_llm::{DocumentParser, Embedder};
use slab_progress::ProgressReporter;
use slab_types::config::{FILE_FETCH_TIMEOUT_MAX, INGEST_DOWNLOAD_RETRIES};
use slab_types::{GpuModelKind, RuntimeError, TaskKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct IngestPayload {
    source: String,
}

pub struct IngestRunner {
    master: MasterClient,
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn Embedder>,
}

impl IngestRunner {
    pub fn new(master: MasterClient, parser: Arc<dyn DocumentParser>, embedder: Arc<dyn Embedder>) -> Self {
        Self { master, parser, embedder }
    }

    async fn download_with_retries(&self, source: &str) -> Result<Vec<u8>, RuntimeError> {
        let mut last_err = None;
        for attempt in 0..=INGEST_DOWNLOAD_RETRIES {
            match self.master.fetch_document_file(source, FILE_FETCH_TIMEOUT_MAX).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    warn!(source, attempt, error = %e, "document download attempt failed");
                    last_err = Some(e);
                    if attempt < INGEST_DOWNLOAD_RETRIES {
                        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RuntimeError::Internal("download failed with no error recorded".into())))
    }
}

#[async_trait]
impl PipelineRunner for IngestRunner {
    fn kind(&self) -> TaskKind {
        TaskKind::Ingest
    }

    fn gpu_kind(&self) -> Option<GpuModelKind> {
        None
    }

    async fn execute(
        &self,
        task_id: &str,
        payload: &serde_json::Value,
        progress: &ProgressReporter,
    ) -> Result<(), RuntimeError> {
        let IngestPayload { source } = serde_json::from_value(payload.clone())
            .map_err(|e| RuntimeError::Validation(format!("invalid ingest payload: {e}")))?;

        let bytes = self.download_with_retries(&source).await?;
        progress.report(TaskKind::Ingest, task_id, 20, "downloaded", slab_types::TaskStatus::Processing).await?;

        let chunks = self.parser.parse(&bytes, &source).await?;
        progress.report(TaskKind::Ingest, task_id, 35, "parsed", slab_types::TaskStatus::Processing).await?;

        let embeddings = self.embedder.embed(&chunks).await?;
        progress.report(TaskKind::Ingest, task_id, 50, "embedded", slab_types::TaskStatus::Processing).await?;

        let metadatas: Vec<serde_json::Value> =
            chunks.iter().map(|_| serde_json::json!({ "source": source })).collect();

        // Fatal if it fails — spec §4.8 "a vector-store failure is fatal for
        // the task". Idempotency (duplicate `(source, text)` rejection) is
        // enforced on the Master side via metadata checks.
        self.master.store_vectors(&embeddings, &chunks, &metadatas).await?;
        progress.report(TaskKind::Ingest, task_id, 90, "stored", slab_types::TaskStatus::Processing).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slab_llm::{LineChunkParser, ZeroEmbedder};
    use slab_progress::ProgressReporter;

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_any_network_call() {
        let runner = IngestRunner::new(
            MasterClient::new("http://127.0.0.1:1"),
            Arc::new(LineChunkParser),
            Arc::new(ZeroEmbedder::new(4)),
        );
        let progress = ProgressReporter::new(Arc::new(slab_kv::InMemoryStore::new()));
        let result = runner.execute("t1", &serde_json::json!({"wrong_field": 1}), &progress).await;
        assert!(matches!(result, Err(RuntimeError::Validation(_))));
    }
}
