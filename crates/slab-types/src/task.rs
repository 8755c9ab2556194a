use serde::{Deserialize, Serialize};

/// Task kind (spec §3 "Task record").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Ingest,
    Image,
    Stt,
    ChatLlm,
}

/// Task lifecycle status. `Processing -> Pending` is forbidden by invariant
/// (spec §3); callers enforce this at the call site rather than in this type
/// since the legal transition set depends on which component is writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl TaskKind {
    /// Key prefix used in `{prefix}:{id}:progress` (spec §6 "Task progress").
    /// `ChatLlm` has no progress record — the chat path polls `llm_result:{id}`
    /// instead (spec §4.6) — so it has no prefix.
    pub fn progress_key_prefix(self) -> Option<&'static str> {
        match self {
            TaskKind::Ingest => Some("rag_task"),
            TaskKind::Image => Some("image_task"),
            TaskKind::Stt => Some("stt_task"),
            TaskKind::ChatLlm => None,
        }
    }
}

/// `{kind, status, percent, message}` progress record (spec §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub kind: TaskKind,
    pub task_id: String,
    pub status: TaskStatus,
    pub percent: u8,
    pub message: String,
}

impl TaskRecord {
    pub fn pending_default(kind: TaskKind, task_id: impl Into<String>) -> Self {
        Self {
            kind,
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            percent: 0,
            message: "waiting".to_string(),
        }
    }
}
