//! Named constants from spec §6 ("Configuration").
//!
//! These are the defaults; both binaries read `Config::from_env` overrides
//! that shadow these values, so nothing here needs to be recompiled to
//! retune the system.

use std::time::Duration;

/// Maximum same-kind GPU batch before a pre-emptive hand-off is considered.
pub const GPU_MAX_BATCH: u32 = 5;

/// Delay before a refused GPU-bound task is re-enqueued.
pub const GPU_RETRY_COUNTDOWN: Duration = Duration::from_secs(5);

/// Idle window after which `release_if_idle` unloads the resident model.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval on which the arbiter's idle-release sweep runs.
pub const RELEASE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Consumer inactivity window before a chat stream is torn down.
pub const STREAM_IDLE_LIMIT: Duration = Duration::from_secs(30);

/// Session context cache TTL.
pub const T_CTX: Duration = Duration::from_secs(3600);

/// Task record / progress record TTL after reaching a terminal status.
pub const T_TASK: Duration = Duration::from_secs(600);

/// Rolling window size for cached messages (spec §3, §4.7).
pub const N_WINDOW: usize = 10;

/// Cache size at which a re-summarize task is triggered.
pub const RESUMMARIZE_THRESHOLD: usize = 10;

/// Number of retrieval chunks requested per chat turn.
pub const RAG_K: usize = 3;

/// Maximum similarity score (lower = closer) kept after retrieval filtering.
pub const RAG_SCORE_MAX: f32 = 1.0;

/// Maximum time the chat producer waits on the LLM backend before declaring
/// an error, when the LLM runs as a separate polled task.
pub const LLM_POLL_MAX: Duration = Duration::from_secs(120);

/// Cancellation flag TTL (spec §3 "Control flag").
pub const STOP_FLAG_TTL: Duration = Duration::from_secs(60);

/// `llm_result:{id}` TTL for the internal `/ai/chat/generate` +
/// `/ai/tasks/{task_id}` polling endpoint (spec §6 "KV key layout").
pub const LLM_RESULT_TTL: Duration = Duration::from_secs(300);

/// Stream buffer TTL applied after the terminal frame is pushed, so a late
/// consumer still has a chance to drain it.
pub const STREAM_BUFFER_TRAILING_TTL: Duration = Duration::from_secs(60);

/// Image generation task timeout (spec §5).
pub const IMAGE_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// STT per-segment-batch task timeout (spec §5).
pub const STT_TASK_TIMEOUT: Duration = Duration::from_secs(180);

/// File-fetch timeout range lower/upper bounds (spec §5); runners pick a
/// value in this range based on payload size.
pub const FILE_FETCH_TIMEOUT_MIN: Duration = Duration::from_secs(60);
pub const FILE_FETCH_TIMEOUT_MAX: Duration = Duration::from_secs(120);

/// Ingest download retry count and image runner retry count (spec §4.8).
pub const INGEST_DOWNLOAD_RETRIES: u32 = 3;
pub const IMAGE_RETRY_MAX_ATTEMPTS: u32 = 20;
pub const IMAGE_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Queue names (spec §6 "Task queues").
pub const Q_DEFAULT: &str = "Q_DEFAULT";
pub const Q_IMAGE: &str = "Q_IMAGE";
pub const Q_STT: &str = "Q_STT";

/// Task names routed by the broker (spec §4.2, §6).
pub mod task_name {
    pub const INGEST: &str = "ingest";
    pub const SAVE_CHAT: &str = "save-chat";
    pub const UPDATE_SUMMARY: &str = "update-summary";
    pub const RELEASE_GPU_IF_IDLE: &str = "release-gpu-if-idle";
    pub const IMAGE_GEN: &str = "image-gen";
    pub const TRANSCRIBE: &str = "transcribe";

    /// `Q_DEFAULT` carries four task names that are split across the two
    /// processes: `ingest` and `release-gpu-if-idle` need the Worker's GPU
    /// arbiter / HTTP file exchange, while `save-chat` and `update-summary`
    /// need the Master's sqlx-backed session store (spec's SPEC_FULL.md §D
    /// "Open Questions from spec §9 are resolved in DESIGN.md"; see
    /// DESIGN.md decision on `Q_DEFAULT` consumer split). Both consumers pop
    /// indiscriminately and re-push an envelope meant for the other side.
    pub fn is_worker_default_task(name: &str) -> bool {
        matches!(name, INGEST | RELEASE_GPU_IF_IDLE)
    }

    pub fn is_master_default_task(name: &str) -> bool {
        matches!(name, SAVE_CHAT | UPDATE_SUMMARY)
    }
}
