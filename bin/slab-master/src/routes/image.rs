//! Image generation intake (spec §6 `/image/generate`, `/image/status`,
//! internal `/image/internal/upload`).

use crate::db::{ImageRecord, ImageStore};
use crate::error::ServerError;
use crate::routes::document::task_status_label;
use crate::state::AppState;
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

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImageGenerateRequest {
    pub user_id: String,
    pub prompt: String,
    pub style: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageGenerateResponse {
    pub image_id: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub status: &'static str,
    pub progress: u8,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageUploadResponse {
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
}

#[derive(OpenApi)]
#[openapi(paths(generate_image, image_status, upload_image_internal))]
pub struct ImageApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/image/generate", post(generate_image))
        .route("/image/status/{task_id}", get(image_status))
        .route("/image/internal/upload", post(upload_image_internal))
}

#[utoipa::path(post, path = "/image/generate", request_body = ImageGenerateRequest, responses((status = 200, body = ImageGenerateResponse)))]
async fn generate_image(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImageGenerateRequest>,
) -> Result<Json<ImageGenerateResponse>, ServerError> {
    if req.prompt.trim().is_empty() {
        return Err(ServerError::BadRequest("prompt must not be empty".to_string()));
    }
    let image_id = Uuid::new_v4().to_string();
    let task_id = state
        .broker
        .submit(
            task_name::IMAGE_GEN,
            serde_json::json!({
                "image_id": image_id,
                "prompt": req.prompt,
                "style": req.style,
                "size": req.size,
            }),
        )
        .await?;

    state
        .store
        .create_image(&ImageRecord {
            image_id: image_id.clone(),
            user_id: req.user_id,
            prompt: req.prompt,
            style: req.style,
            size: req.size,
            task_id: task_id.clone(),
            file_path: None,
            file_name: None,
            created_at: Utc::now(),
        })
        .await?;

    Ok(Json(ImageGenerateResponse { image_id, task_id }))
}

#[utoipa::path(
    get,
    path = "/image/status/{task_id}",
    params(("task_id" = String, Path)),
    responses((status = 200, body = TaskStatusResponse))
)]
async fn image_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ServerError> {
    let record = state.progress.read(TaskKind::Image, &task_id).await?;
    Ok(Json(TaskStatusResponse { status: task_status_label(record.status), progress: record.percent, message: record.message }))
}

/// `POST /image/internal/upload` multipart `file`, `image_id` (spec §6). The
/// Worker's image runner calls this after generation; Master owns the
/// storage directory so the write path stays symmetric with
/// `/document/internal/file` (see DESIGN.md Open Question on image runner
/// write-symmetry).
#[utoipa::path(post, path = "/image/internal/upload", responses((status = 200, body = ImageUploadResponse)))]
async fn upload_image_internal(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImageUploadResponse>, ServerError> {
    let mut image_id = None;
    let mut bytes = None;
    while let Some(field) =
        multipart.next_field().await.map_err(|e| ServerError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("image_id") => {
                image_id = Some(field.text().await.map_err(|e| ServerError::BadRequest(e.to_string()))?);
            }
            Some("file") => {
                bytes = Some(field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?);
            }
            _ => {}
        }
    }
    let image_id = image_id.ok_or_else(|| ServerError::BadRequest("missing image_id field".to_string()))?;
    let bytes = bytes.ok_or_else(|| ServerError::BadRequest("missing file field".to_string()))?;

    tokio::fs::create_dir_all(&state.config.image_storage_dir)
        .await
        .map_err(|e| ServerError::Internal(format!("create image storage dir: {e}")))?;
    let file_name = format!("{image_id}.png");
    let file_path = format!("{}/{}", state.config.image_storage_dir.trim_end_matches('/'), file_name);
    tokio::fs::write(&file_path, &bytes).await.map_err(|e| ServerError::Internal(format!("write image: {e}")))?;

    state.store.set_image_file(&image_id, &file_path, &file_name).await?;

    Ok(Json(ImageUploadResponse { file_path, file_name, file_size: bytes.len() as u64 }))
}
