//! Meeting intake + completion (spec §6 `/meeting/upload`,
//! `/meeting/status`, internal `/meeting/internal/file/{name}`,
//! `/meeting/internal/complete`).

use crate::db::{MeetingRecord, MeetingStore};
use crate::error::ServerError;
use crate::routes::document::task_status_label;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use slab_types::config::task_name;
use slab_types::TaskKind;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct MeetingUploadResponse {
    pub meeting_id: String,
    #[serde(rename = "sttTaskId")]
    pub stt_task_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub status: &'static str,
    pub progress: u8,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteMeetingRequest {
    pub meeting_id: String,
    pub transcript: String,
    pub duration_secs: u64,
    pub summary: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompleteMeetingResponse {
    pub message: &'static str,
}

#[derive(OpenApi)]
#[openapi(paths(upload_meeting, meeting_status, meeting_internal_file, complete_meeting))]
pub struct MeetingApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/meeting/upload", post(upload_meeting))
        .route("/meeting/status/{task_id}", get(meeting_status))
        .route("/meeting/internal/file/{name}", get(meeting_internal_file))
        .route("/meeting/internal/complete", post(complete_meeting))
}

#[utoipa::path(post, path = "/meeting/upload", responses((status = 200, body = MeetingUploadResponse)))]
async fn upload_meeting(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<MeetingUploadResponse>, ServerError> {
    let mut file_name = None;
    let mut bytes: Option<Bytes> = None;
    while let Some(field) =
        multipart.next_field().await.map_err(|e| ServerError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(str::to_string);
            bytes = Some(field.bytes().await.map_err(|e| ServerError::BadRequest(format!("invalid file field: {e}")))?);
        }
    }
    let file_name = file_name.ok_or_else(|| ServerError::BadRequest("missing file field".to_string()))?;
    let bytes = bytes.ok_or_else(|| ServerError::BadRequest("missing file field".to_string()))?;

    let meeting_id = Uuid::new_v4().to_string();
    let stored_name = format!("{meeting_id}_{file_name}");
    tokio::fs::create_dir_all(&state.config.meeting_storage_dir)
        .await
        .map_err(|e| ServerError::Internal(format!("create meeting storage dir: {e}")))?;
    let file_path = format!("{}/{}", state.config.meeting_storage_dir.trim_end_matches('/'), stored_name);
    tokio::fs::write(&file_path, &bytes).await.map_err(|e| ServerError::Internal(format!("write meeting file: {e}")))?;

    let stt_task_id =
        state.broker.submit(task_name::TRANSCRIBE, serde_json::json!({ "meeting_id": meeting_id, "source": stored_name })).await?;

    state
        .store
        .create_meeting(&MeetingRecord {
            meeting_id: meeting_id.clone(),
            file_name,
            file_path,
            stt_task_id: stt_task_id.clone(),
            transcript: None,
            summary: None,
            duration_secs: None,
            created_at: Utc::now(),
        })
        .await?;

    Ok(Json(MeetingUploadResponse { meeting_id, stt_task_id }))
}

#[utoipa::path(
    get,
    path = "/meeting/status/{task_id}",
    params(("task_id" = String, Path)),
    responses((status = 200, body = TaskStatusResponse))
)]
async fn meeting_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ServerError> {
    let record = state.progress.read(TaskKind::Stt, &task_id).await?;
    Ok(Json(TaskStatusResponse { status: task_status_label(record.status), progress: record.percent, message: record.message }))
}

#[utoipa::path(
    get,
    path = "/meeting/internal/file/{name}",
    params(("name" = String, Path)),
    responses((status = 200, description = "raw file bytes"))
)]
async fn meeting_internal_file(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Bytes, ServerError> {
    if name.contains("..") || name.contains('/') {
        return Err(ServerError::BadRequest("invalid file name".to_string()));
    }
    let path = format!("{}/{}", state.config.meeting_storage_dir.trim_end_matches('/'), name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Bytes::from(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ServerError::NotFound(format!("{name} not found"))),
        Err(e) => Err(ServerError::Internal(format!("read {name}: {e}"))),
    }
}

/// `POST /meeting/internal/complete` (implied by the Worker's STT runner,
/// spec §4.8 "Updates the meeting record" — not literally in spec §6's route
/// table but required by `slab_pipelines::MasterClient::complete_meeting`).
#[utoipa::path(post, path = "/meeting/internal/complete", request_body = CompleteMeetingRequest, responses((status = 200, body = CompleteMeetingResponse)))]
async fn complete_meeting(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompleteMeetingRequest>,
) -> Result<Json<CompleteMeetingResponse>, ServerError> {
    state
        .store
        .complete_meeting(&req.meeting_id, &req.transcript, req.duration_secs, req.summary.as_deref())
        .await?;
    Ok(Json(CompleteMeetingResponse { message: "meeting completed" }))
}
