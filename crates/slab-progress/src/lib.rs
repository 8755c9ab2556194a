//! C4 — progress reporter.
//!
//! A thin wrapper over [`KvStore`] storing one [`TaskRecord`] per
//! `{rag|image|stt}_task:{id}:progress` key (spec §6), refreshed on every
//! `report` call with `T_TASK` TTL. A read against a missing or expired key
//! yields the spec's documented default: pending, 0%, "waiting" — never an
//! error, since a task id that hasn't reported yet is a normal transient
//! state, not a failure.

use slab_kv::{KvJsonExt, KvStore};
use slab_types::config::T_TASK;
use slab_types::{RuntimeError, TaskKind, TaskRecord, TaskStatus};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ProgressReporter {
    kv: Arc<dyn KvStore>,
}

impl ProgressReporter {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(kind: TaskKind, task_id: &str) -> Result<String, RuntimeError> {
        let prefix = kind.progress_key_prefix().ok_or_else(|| {
            RuntimeError::Internal(format!("{kind:?} has no progress record"))
        })?;
        Ok(format!("{prefix}:{task_id}:progress"))
    }

    /// Write (or overwrite) the progress record for `task_id`, refreshing its
    /// TTL. Callers are expected to only move `percent` forward and `status`
    /// toward a terminal state; this function does not enforce monotonicity
    /// itself so a caller correcting a record after a retry still works.
    pub async fn report(
        &self,
        kind: TaskKind,
        task_id: &str,
        percent: u8,
        message: impl Into<String>,
        status: TaskStatus,
    ) -> Result<(), RuntimeError> {
        let record = TaskRecord { kind, task_id: task_id.to_string(), status, percent, message: message.into() };
        debug!(task_id, percent, ?status, "progress reported");
        self.kv.set_json(&Self::key(kind, task_id)?, &record, Some(T_TASK)).await
    }

    /// Read the current progress record, defaulting to pending/0/"waiting"
    /// when the key is absent or expired (spec §4.4).
    pub async fn read(&self, kind: TaskKind, task_id: &str) -> Result<TaskRecord, RuntimeError> {
        let key = Self::key(kind, task_id)?;
        match self.kv.get_json::<TaskRecord>(&key).await? {
            Some(record) => Ok(record),
            None => Ok(TaskRecord::pending_default(kind, task_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slab_kv::InMemoryStore;

    fn reporter() -> ProgressReporter {
        ProgressReporter::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn read_defaults_when_absent() {
        let r = reporter();
        let record = r.read(TaskKind::Image, "missing-id").await.unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.percent, 0);
        assert_eq!(record.message, "waiting");
    }

    #[tokio::test]
    async fn report_then_read_round_trips() {
        let r = reporter();
        r.report(TaskKind::Ingest, "t1", 40, "parsing pages", TaskStatus::Processing).await.unwrap();
        let record = r.read(TaskKind::Ingest, "t1").await.unwrap();
        assert_eq!(record.percent, 40);
        assert_eq!(record.message, "parsing pages");
        assert_eq!(record.status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn distinct_kinds_do_not_collide_on_same_id() {
        let r = reporter();
        r.report(TaskKind::Image, "shared-id", 10, "queued", TaskStatus::Pending).await.unwrap();
        r.report(TaskKind::Stt, "shared-id", 90, "finalizing", TaskStatus::Processing).await.unwrap();
        let image = r.read(TaskKind::Image, "shared-id").await.unwrap();
        let stt = r.read(TaskKind::Stt, "shared-id").await.unwrap();
        assert_eq!(image.percent, 10);
        assert_eq!(stt.percent, 90);
    }

    #[tokio::test]
    async fn chat_llm_kind_has_no_progress_key() {
        let r = reporter();
        let err = r.report(TaskKind::ChatLlm, "t1", 0, "x", TaskStatus::Pending).await;
        assert!(err.is_err());
    }
}
