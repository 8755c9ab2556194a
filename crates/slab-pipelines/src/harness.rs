//! Shared runner harness (spec §4.8 "All three share").
//!
//! Acquires the GPU for GPU-bound runners, reports the start/done/failed
//! progress points, and guarantees exactly one `after_task` call per
//! admitted acquire even if the runner panics or returns early on error.

use async_trait::async_trait;
use futures::FutureExt;
use slab_broker::{TaskBroker, TaskEnvelope};
use slab_gpu::GpuArbiter;
use slab_progress::ProgressReporter;
use slab_types::config::GPU_RETRY_COUNTDOWN;
use slab_types::{GpuModelKind, RuntimeError, TaskKind, TaskStatus};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, warn};

#[async_trait]
pub trait PipelineRunner: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// `Some` for a GPU-bound runner (image, STT); `None` for ingest.
    fn gpu_kind(&self) -> Option<GpuModelKind> {
        None
    }

    async fn execute(
        &self,
        task_id: &str,
        payload: &serde_json::Value,
        progress: &ProgressReporter,
    ) -> Result<(), RuntimeError>;
}

/// Run one task envelope against `runner`. On GPU admission refusal, the
/// envelope is re-submitted to its own queue after `GPU_RETRY_COUNTDOWN`
/// rather than spin-waiting (spec §4.3, §5 "GPU acquire retry").
pub async fn run_task(
    runner: &dyn PipelineRunner,
    envelope: TaskEnvelope,
    progress: &ProgressReporter,
    broker: &TaskBroker,
    arbiter: Option<&Arc<GpuArbiter>>,
) {
    let TaskEnvelope { name, id, payload } = envelope;

    if let Some(gpu_kind) = runner.gpu_kind() {
        let arbiter = match arbiter {
            Some(a) => a,
            None => {
                error!(task_id = %id, "gpu-bound runner invoked without an arbiter");
                return;
            }
        };
        match arbiter.try_acquire(gpu_kind).await {
            Ok(true) => {}
            Ok(false) => {
                let broker = broker.clone();
                let envelope = TaskEnvelope { name, id: id.clone(), payload };
                tokio::spawn(async move {
                    tokio::time::sleep(GPU_RETRY_COUNTDOWN).await;
                    if let Err(e) = broker.resubmit(envelope).await {
                        error!(task_id = %id, error = %e, "failed to re-enqueue gpu-refused task");
                    }
                });
                return;
            }
            Err(e) => {
                let _ = progress.report(runner.kind(), &id, 0, e.to_string(), TaskStatus::Failed).await;
                return;
            }
        }
    }

    if let Err(e) = progress.report(runner.kind(), &id, 5, "start", TaskStatus::Processing).await {
        warn!(task_id = %id, error = %e, "failed to report start progress");
    }

    // Caught so a runner panic still reaches `after_task` below — the GPU
    // must never be left held by a task that no longer exists.
    let outcome = AssertUnwindSafe(runner.execute(&id, &payload, progress)).catch_unwind().await;

    if let Some(gpu_kind) = runner.gpu_kind() {
        if let Some(arbiter) = arbiter {
            if let Err(e) = arbiter.after_task(gpu_kind).await {
                error!(task_id = %id, error = %e, "after_task failed; gpu state may be stale");
            }
        }
    }

    let result = match outcome {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "runner panicked".to_string());
            Err(RuntimeError::Internal(message))
        }
    };

    match result {
        Ok(()) => {
            let _ = progress.report(runner.kind(), &id, 100, "done", TaskStatus::Completed).await;
        }
        Err(e) => {
            warn!(task_id = %id, error = %e, "task failed");
            let last_percent = progress.read(runner.kind(), &id).await.map(|r| r.percent).unwrap_or(0);
            let _ = progress.report(runner.kind(), &id, last_percent, e.to_string(), TaskStatus::Failed).await;
        }
    }
}
