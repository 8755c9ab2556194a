//! HTTP adapters to the external image-generation and speech-to-text model
//! host (spec §1 "Out of scope" — real model inference is intentionally
//! left as a black box this binary just calls over HTTP), plus the
//! [`slab_gpu::ModelHousekeeping`] binding that drives its load/unload
//! lifecycle from the GPU arbiter's decisions.

use async_trait::async_trait;
use serde::Deserialize;
use slab_gpu::ModelHousekeeping;
use slab_pipelines::image::ImageHost;
use slab_pipelines::stt::{SttModel, TranscriptLine};
use slab_types::config::STT_TASK_TIMEOUT;
use slab_types::{GpuModelKind, RuntimeError};
use tracing::warn;

pub struct ModelHost {
    client: reqwest::Client,
    base_url: String,
}

impl ModelHost {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn map_transport_err(e: reqwest::Error) -> RuntimeError {
        if e.is_timeout() {
            RuntimeError::PeerTimeout(std::time::Duration::default())
        } else {
            RuntimeError::GpuModelFailure { kind: "unknown".to_string(), message: e.to_string() }
        }
    }
}

#[async_trait]
impl ImageHost for ModelHost {
    async fn generate(&self, prompt: &str, style: Option<&str>, size: Option<&str>) -> Result<Vec<u8>, RuntimeError> {
        let response = self
            .client
            .post(self.url("/image/generate"))
            .json(&serde_json::json!({ "prompt": prompt, "style": style, "size": size }))
            .send()
            .await
            .map_err(Self::map_transport_err)?
            .error_for_status()
            .map_err(Self::map_transport_err)?;
        response.bytes().await.map(|b| b.to_vec()).map_err(Self::map_transport_err)
    }

    async fn release(&self) {
        if let Err(e) = self.client.post(self.url("/image/release")).send().await {
            warn!(error = %e, "image host release call failed");
        }
    }
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    start: f32,
    end: f32,
    text: String,
}

#[async_trait]
impl SttModel for ModelHost {
    async fn transcribe(&self, audio: &[u8]) -> Result<Vec<TranscriptLine>, RuntimeError> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec()).file_name("audio.bin");
        let form = reqwest::multipart::Form::new()
            .text("beam", "5")
            .text("vad", "true")
            .part("audio", part);
        let response = self
            .client
            .post(self.url("/stt/transcribe"))
            .multipart(form)
            .timeout(STT_TASK_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_err)?
            .error_for_status()
            .map_err(Self::map_transport_err)?;
        let segments: Vec<SegmentResponse> = response.json().await.map_err(Self::map_transport_err)?;
        Ok(segments
            .into_iter()
            .map(|s| TranscriptLine { start_secs: s.start, end_secs: s.end, text: s.text })
            .collect())
    }

    async fn release(&self) {
        if let Err(e) = self.client.post(self.url("/stt/release")).send().await {
            warn!(error = %e, "stt host release call failed");
        }
    }
}

/// Binds the GPU arbiter's load/unload/after_task hooks to the same external
/// host, so `active_model` transitions actually move GPU residency on the
/// model-hosting side (spec §4.3 "the arbiter...may load or unload").
pub struct RemoteModelHousekeeping {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteModelHousekeeping {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ModelHousekeeping for RemoteModelHousekeeping {
    async fn load(&self, kind: GpuModelKind) -> Result<(), RuntimeError> {
        self.client
            .post(self.url(&format!("/models/{}/load", kind.as_str())))
            .send()
            .await
            .map_err(|e| RuntimeError::GpuModelFailure { kind: kind.as_str().to_string(), message: e.to_string() })?
            .error_for_status()
            .map_err(|e| RuntimeError::GpuModelFailure { kind: kind.as_str().to_string(), message: e.to_string() })?;
        Ok(())
    }

    async fn unload(&self, kind: GpuModelKind) {
        if let Err(e) = self.client.post(self.url(&format!("/models/{}/unload", kind.as_str()))).send().await {
            warn!(kind = %kind, error = %e, "model unload call failed");
        }
    }

    async fn after_task(&self, kind: GpuModelKind) {
        if let Err(e) = self.client.post(self.url(&format!("/models/{}/after-task", kind.as_str()))).send().await {
            warn!(kind = %kind, error = %e, "model after-task call failed");
        }
    }
}
