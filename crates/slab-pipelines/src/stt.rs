//! Speech-to-text runner (spec §4.8 "STT runner"). GPU-bound.

use crate::harness::PipelineRunner;
use crate::master_client::MasterClient;
use async_trait::async_trait;
use serde::Deserialize;
use slab_progress::ProgressReporter;
use slab_types::config::STT_TASK_TIMEOUT;
use slab_types::{GpuModelKind, RuntimeError, TaskKind, TaskStatus};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct SttPayload {
    meeting_id: String,
    source: String,
}

/// One decoded transcript line (spec §4.8 "timestamped transcript lines").
#[derive(Debug, Clone)]
pub struct TranscriptLine {
    pub start_secs: f32,
    pub end_secs: f32,
    pub text: String,
}

/// The external speech-to-text model (spec §1 "Out of scope"). Beam width 5
/// and voice-activity detection are fixed decode parameters, not tunables,
/// so they're baked into the trait contract rather than passed as arguments.
#[async_trait]
pub trait SttModel: Send + Sync {
    /// Decode `audio` with beam=5, VAD on, returning ordered transcript
    /// lines with timestamps relative to the start of the clip.
    async fn transcribe(&self, audio: &[u8]) -> Result<Vec<TranscriptLine>, RuntimeError>;

    /// Free intermediate tensors held from the last decode.
    async fn release(&self) {}
}

fn render_transcript(lines: &[TranscriptLine]) -> String {
    lines
        .iter()
        .map(|l| format!("[{:.1}-{:.1}] {}", l.start_secs, l.end_secs, l.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn duration_secs(lines: &[TranscriptLine]) -> u64 {
    lines.iter().map(|l| l.end_secs).fold(0.0_f32, f32::max).round() as u64
}

pub struct SttRunner {
    master: MasterClient,
    model: Box<dyn SttModel>,
}

impl SttRunner {
    pub fn new(master: MasterClient, model: Box<dyn SttModel>) -> Self {
        Self { master, model }
    }

    /// Best-effort meeting summary, requested from the Master's LLM via
    /// `/ai/chat/generate` + `/ai/tasks/{id}` (spec §4.8, §6). A failure or
    /// an empty transcript leaves the summary empty rather than failing
    /// the task.
    async fn summarize(&self, transcript: &str) -> Option<String> {
        if transcript.trim().is_empty() {
            return None;
        }
        let prompt = format!("Summarize this meeting transcript in a few sentences:\n{transcript}");
        match self.master.generate_and_await_completion(&prompt).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "meeting summary request failed, leaving summary empty");
                None
            }
        }
    }
}

#[async_trait]
impl PipelineRunner for SttRunner {
    fn kind(&self) -> TaskKind {
        TaskKind::Stt
    }

    fn gpu_kind(&self) -> Option<GpuModelKind> {
        Some(GpuModelKind::Stt)
    }

    async fn execute(
        &self,
        task_id: &str,
        payload: &serde_json::Value,
        progress: &ProgressReporter,
    ) -> Result<(), RuntimeError> {
        let SttPayload { meeting_id, source } = serde_json::from_value(payload.clone())
            .map_err(|e| RuntimeError::Validation(format!("invalid stt payload: {e}")))?;

        let audio = self.master.fetch_meeting_file(&source, slab_types::config::FILE_FETCH_TIMEOUT_MAX).await?;
        progress.report(TaskKind::Stt, task_id, 30, "downloaded", TaskStatus::Processing).await?;

        let lines = match tokio::time::timeout(STT_TASK_TIMEOUT, self.model.transcribe(&audio)).await {
            Ok(result) => result?,
            Err(_) => return Err(RuntimeError::PeerTimeout(STT_TASK_TIMEOUT)),
        };
        progress.report(TaskKind::Stt, task_id, 70, "transcribed", TaskStatus::Processing).await?;

        let transcript = render_transcript(&lines);
        let duration = duration_secs(&lines);
        let summary = self.summarize(&transcript).await;
        progress.report(TaskKind::Stt, task_id, 90, "summarized", TaskStatus::Processing).await?;

        self.master.complete_meeting(&meeting_id, &transcript, duration, summary.as_deref()).await?;
        self.model.release().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_lines_render_with_timestamps() {
        let lines = vec![
            TranscriptLine { start_secs: 0.0, end_secs: 2.5, text: "hello".to_string() },
            TranscriptLine { start_secs: 2.5, end_secs: 5.0, text: "world".to_string() },
        ];
        assert_eq!(render_transcript(&lines), "[0.0-2.5] hello\n[2.5-5.0] world");
        assert_eq!(duration_secs(&lines), 5);
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_any_network_call() {
        struct FakeModel;
        #[async_trait]
        impl SttModel for FakeModel {
            async fn transcribe(&self, _audio: &[u8]) -> Result<Vec<TranscriptLine>, RuntimeError> {
                panic!("should not be invoked");
            }
        }

        let runner = SttRunner::new(MasterClient::new("http://127.0.0.1:1"), Box::new(FakeModel));
        let progress = ProgressReporter::new(std::sync::Arc::new(slab_kv::InMemoryStore::new()));
        let result = runner.execute("t1", &serde_json::json!({"wrong_field": 1}), &progress).await;
        assert!(matches!(result, Err(RuntimeError::Validation(_))));
    }
}
