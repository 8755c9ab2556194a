//! Worker→Master internal HTTP file-exchange client (spec §6 "HTTP
//! (internal, Master↔Worker)"). Mirrors the retry-with-backoff client shape
//! used for GitHub asset fetches in the teacher's fetch tool, aimed instead
//! at the Master's internal endpoints.

use reqwest::multipart;
use serde::{Deserialize, Serialize};
use slab_types::config::LLM_POLL_MAX;
use slab_types::RuntimeError;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
struct StoreVectorsRequest<'a> {
    embeddings: &'a [Vec<f32>],
    texts: &'a [String],
    metadatas: &'a [serde_json::Value],
}

#[derive(Debug, Deserialize)]
pub struct UploadImageResponse {
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize)]
struct CompleteMeetingRequest<'a> {
    meeting_id: &'a str,
    transcript: &'a str,
    duration_secs: u64,
    summary: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LlmTaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct LlmTaskResponse {
    status: LlmTaskStatus,
    result: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct MasterClient {
    client: reqwest::Client,
    base_url: String,
}

impl MasterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn map_transport_err(e: reqwest::Error) -> RuntimeError {
        if e.is_timeout() {
            RuntimeError::PeerTimeout(Duration::default())
        } else {
            RuntimeError::PeerRequest(e.to_string())
        }
    }

    /// `GET /document/internal/file/{name}`.
    pub async fn fetch_document_file(&self, name: &str, timeout: Duration) -> Result<Vec<u8>, RuntimeError> {
        self.fetch_file(&format!("/document/internal/file/{name}"), timeout).await
    }

    /// `GET /meeting/internal/file/{name}`.
    pub async fn fetch_meeting_file(&self, name: &str, timeout: Duration) -> Result<Vec<u8>, RuntimeError> {
        self.fetch_file(&format!("/meeting/internal/file/{name}"), timeout).await
    }

    async fn fetch_file(&self, path: &str, timeout: Duration) -> Result<Vec<u8>, RuntimeError> {
        let response = self
            .client
            .get(self.url(path))
            .timeout(timeout)
            .send()
            .await
            .map_err(Self::map_transport_err)?
            .error_for_status()
            .map_err(Self::map_transport_err)?;
        response.bytes().await.map(|b| b.to_vec()).map_err(Self::map_transport_err)
    }

    /// `POST /document/internal/store-vectors`. All three arrays must be
    /// equal length; callers that violate this get a validation error
    /// before anything is sent (spec §6).
    pub async fn store_vectors(
        &self,
        embeddings: &[Vec<f32>],
        texts: &[String],
        metadatas: &[serde_json::Value],
    ) -> Result<(), RuntimeError> {
        if embeddings.len() != texts.len() || texts.len() != metadatas.len() {
            return Err(RuntimeError::Validation(
                "embeddings, texts, and metadatas must have equal length".to_string(),
            ));
        }
        self.client
            .post(self.url("/document/internal/store-vectors"))
            .json(&StoreVectorsRequest { embeddings, texts, metadatas })
            .send()
            .await
            .map_err(Self::map_transport_err)?
            .error_for_status()
            .map_err(Self::map_transport_err)?;
        Ok(())
    }

    /// `POST /image/internal/upload` multipart `file`, `image_id`.
    pub async fn upload_image(&self, bytes: Vec<u8>, image_id: &str) -> Result<UploadImageResponse, RuntimeError> {
        let part = multipart::Part::bytes(bytes).file_name(format!("{image_id}.png"));
        let form = multipart::Form::new().text("image_id", image_id.to_string()).part("file", part);
        let response = self
            .client
            .post(self.url("/image/internal/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_transport_err)?
            .error_for_status()
            .map_err(Self::map_transport_err)?;
        response.json().await.map_err(Self::map_transport_err)
    }

    /// `POST /meeting/internal/complete`. Reports the finished transcript
    /// (and, best-effort, a summary) back to the Master, which owns the
    /// meeting record (spec §4.8 "Updates the meeting record").
    pub async fn complete_meeting(
        &self,
        meeting_id: &str,
        transcript: &str,
        duration_secs: u64,
        summary: Option<&str>,
    ) -> Result<(), RuntimeError> {
        self.client
            .post(self.url("/meeting/internal/complete"))
            .json(&CompleteMeetingRequest { meeting_id, transcript, duration_secs, summary })
            .send()
            .await
            .map_err(Self::map_transport_err)?
            .error_for_status()
            .map_err(Self::map_transport_err)?;
        Ok(())
    }

    /// `POST /ai/chat/generate` + poll `GET /ai/tasks/{task_id}` (spec §6,
    /// §4.6 "if the LLM backend is on a separate node, the producer polls
    /// the LLM task for up to 120 s"). Non-streaming, used by runners that
    /// need a single completion (the STT runner's meeting summary) rather
    /// than a token stream.
    pub async fn generate_and_await_completion(&self, message: &str) -> Result<String, RuntimeError> {
        let response: GenerateResponse = self
            .client
            .post(self.url("/ai/chat/generate"))
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await
            .map_err(Self::map_transport_err)?
            .error_for_status()
            .map_err(Self::map_transport_err)?
            .json()
            .await
            .map_err(Self::map_transport_err)?;

        let deadline = tokio::time::Instant::now() + LLM_POLL_MAX;
        loop {
            let task: LlmTaskResponse = self
                .client
                .get(self.url(&format!("/ai/tasks/{}", response.task_id)))
                .send()
                .await
                .map_err(Self::map_transport_err)?
                .error_for_status()
                .map_err(Self::map_transport_err)?
                .json()
                .await
                .map_err(Self::map_transport_err)?;

            match task.status {
                LlmTaskStatus::Completed => {
                    return task
                        .result
                        .ok_or_else(|| RuntimeError::LlmFailure("completed task carried no result".to_string()))
                }
                LlmTaskStatus::Failed => {
                    return Err(RuntimeError::LlmFailure(task.error.unwrap_or_else(|| "llm task failed".to_string())))
                }
                LlmTaskStatus::Pending | LlmTaskStatus::Processing => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(RuntimeError::PeerTimeout(LLM_POLL_MAX));
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_vectors_payload_validated_before_send() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let client = MasterClient::new("http://127.0.0.1:1");
        let result = rt.block_on(client.store_vectors(
            &[vec![0.0]],
            &["a".to_string(), "b".to_string()],
            &[serde_json::json!({})],
        ));
        assert!(matches!(result, Err(RuntimeError::Validation(_))));
    }
}
