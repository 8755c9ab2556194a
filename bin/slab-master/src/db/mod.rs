//! Persistent storage traits. Session summaries, message history, and the
//! document/image/meeting records are durable state that outlives the KV
//! store's TTLs; the KV store (progress, GPU state, session cache, stream
//! buffers) is the fast, ephemeral layer in front of it.
//!
//! Mirrors the teacher's `RequestStore` shape: plain traits returning
//! `impl Future` directly rather than `#[async_trait]`, since these are
//! implemented exactly once (`SqliteStore`) and never boxed as a trait
//! object.

pub mod sqlite;

use chrono::{DateTime, Utc};
use slab_types::Role;
use uuid::Uuid;

pub use sqlite::SqliteStore;

/// One logged HTTP request, written by the trace middleware (mirrors the
/// teacher's `RequestRecord`).
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub status: Option<i64>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub trait RequestStore: Send + Sync {
    fn insert(&self, record: RequestRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    fn update_response(
        &self,
        id: Uuid,
        status: i64,
        latency_ms: i64,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
}

/// One persisted chat turn.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub role: Role,
    pub content: String,
}

/// Session summaries and message history (spec §3 "Session context", §6
/// `/chat/sessions/{id}/messages`, `/ai/sessions/{id}/update-summary`).
pub trait ChatStore: Send + Sync {
    fn ensure_session(&self, session_id: &str) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> impl std::future::Future<Output = Result<i64, sqlx::Error>> + Send;

    fn list_messages(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<StoredMessage>, sqlx::Error>> + Send;

    fn messages_by_ids(
        &self,
        ids: &[i64],
    ) -> impl std::future::Future<Output = Result<Vec<StoredMessage>, sqlx::Error>> + Send;

    fn get_summary(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, sqlx::Error>> + Send;

    fn set_summary(
        &self,
        session_id: &str,
        summary: &str,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
}

/// Document intake records (spec §6 `/document/upload`, `/document/status`).
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: String,
    pub file_name: String,
    pub file_path: String,
    pub rag_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub trait DocumentStore: Send + Sync {
    fn create_document(
        &self,
        record: &DocumentRecord,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_document(
        &self,
        document_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<DocumentRecord>, sqlx::Error>> + Send;
}

/// Image generation records (spec §6 `/image/generate`, `/image/status`,
/// `/image/internal/upload`).
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub image_id: String,
    pub user_id: String,
    pub prompt: String,
    pub style: Option<String>,
    pub size: Option<String>,
    pub task_id: String,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub trait ImageStore: Send + Sync {
    fn create_image(&self, record: &ImageRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    fn set_image_file(
        &self,
        image_id: &str,
        file_path: &str,
        file_name: &str,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_image(
        &self,
        image_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ImageRecord>, sqlx::Error>> + Send;
}

/// Meeting intake + completion records (spec §6 `/meeting/upload`,
/// `/meeting/status`, internal `/meeting/internal/complete`).
#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub meeting_id: String,
    pub file_name: String,
    pub file_path: String,
    pub stt_task_id: String,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub duration_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub trait MeetingStore: Send + Sync {
    fn create_meeting(
        &self,
        record: &MeetingRecord,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    fn complete_meeting(
        &self,
        meeting_id: &str,
        transcript: &str,
        duration_secs: u64,
        summary: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_meeting(
        &self,
        meeting_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<MeetingRecord>, sqlx::Error>> + Send;
}

/// One embedded chunk row.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// Backing store for retrieval (spec §6 `/document/internal/store-vectors`).
/// `source` is pulled out of each row's metadata and used, together with
/// `text`, as the idempotency key the ingest runner relies on (SPEC_FULL.md
/// §C "idempotency on ingest").
pub trait VectorStore: Send + Sync {
    /// Inserts rows, silently skipping any whose `(source, text)` pair
    /// already exists. Returns the number actually inserted.
    fn insert_vectors(
        &self,
        rows: &[VectorRow],
    ) -> impl std::future::Future<Output = Result<usize, sqlx::Error>> + Send;

    fn all_vectors(&self) -> impl std::future::Future<Output = Result<Vec<VectorRow>, sqlx::Error>> + Send;
}
