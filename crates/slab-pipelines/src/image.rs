//! Image generation runner (spec §4.8 "Image runner"). GPU-bound.

use crate::harness::PipelineRunner;
use crate::master_client::MasterClient;
use async_trait::async_trait;
use serde::Deserialize;
use slab_progress::ProgressReporter;
use slab_types::config::{IMAGE_RETRY_DELAY, IMAGE_RETRY_MAX_ATTEMPTS, IMAGE_TASK_TIMEOUT};
use slab_types::{GpuModelKind, RuntimeError, TaskKind, TaskStatus};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct ImagePayload {
    image_id: String,
    prompt: String,
    style: Option<String>,
    size: Option<String>,
}

/// The external image-generation service (spec §1 "Out of scope"). A real
/// implementation posts a workflow descriptor and polls or streams
/// completion; this seam hides that entirely.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn generate(&self, prompt: &str, style: Option<&str>, size: Option<&str>) -> Result<Vec<u8>, RuntimeError>;

    /// Free intermediate tensors held from the last generation. Called by
    /// the runner after upload; a no-op host needs nothing here.
    async fn release(&self) {}
}

/// Substrings that mark a transient transport failure worth retrying
/// (spec §4.8 "Image runner").
const RETRYABLE_SUBSTRINGS: &[&str] = &["connection", "refused", "disconnect", "resolve", "lost"];

fn is_retryable(err: &RuntimeError) -> bool {
    let message = err.to_string().to_lowercase();
    RETRYABLE_SUBSTRINGS.iter().any(|needle| message.contains(needle))
}

pub struct ImageRunner {
    master: MasterClient,
    host: Box<dyn ImageHost>,
}

impl ImageRunner {
    pub fn new(master: MasterClient, host: Box<dyn ImageHost>) -> Self {
        Self { master, host }
    }

    async fn generate_with_retry(
        &self,
        prompt: &str,
        style: Option<&str>,
        size: Option<&str>,
    ) -> Result<Vec<u8>, RuntimeError> {
        let mut attempt = 0;
        loop {
            match tokio::time::timeout(IMAGE_TASK_TIMEOUT, self.host.generate(prompt, style, size)).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(e)) if is_retryable(&e) && attempt < IMAGE_RETRY_MAX_ATTEMPTS => {
                    attempt += 1;
                    warn!(attempt, error = %e, "retryable image host failure");
                    tokio::time::sleep(IMAGE_RETRY_DELAY).await;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(RuntimeError::PeerTimeout(IMAGE_TASK_TIMEOUT)),
            }
        }
    }
}

#[async_trait]
impl PipelineRunner for ImageRunner {
    fn kind(&self) -> TaskKind {
        TaskKind::Image
    }

    fn gpu_kind(&self) -> Option<GpuModelKind> {
        Some(GpuModelKind::Image)
    }

    async fn execute(
        &self,
        task_id: &str,
        payload: &serde_json::Value,
        progress: &ProgressReporter,
    ) -> Result<(), RuntimeError> {
        let ImagePayload { image_id, prompt, style, size } = serde_json::from_value(payload.clone())
            .map_err(|e| RuntimeError::Validation(format!("invalid image payload: {e}")))?;

        progress.report(TaskKind::Image, task_id, 35, "model loaded", TaskStatus::Processing).await?;
        let bytes = self.generate_with_retry(&prompt, style.as_deref(), size.as_deref()).await?;
        progress.report(TaskKind::Image, task_id, 80, "generated", TaskStatus::Processing).await?;

        self.master.upload_image(bytes, &image_id).await?;
        progress.report(TaskKind::Image, task_id, 90, "uploaded", TaskStatus::Processing).await?;
        self.host.release().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_substrings_match_case_insensitively() {
        let err = RuntimeError::PeerRequest("Connection refused by host".to_string());
        assert!(is_retryable(&err));
        let err = RuntimeError::PeerRequest("invalid prompt".to_string());
        assert!(!is_retryable(&err));
    }
}
