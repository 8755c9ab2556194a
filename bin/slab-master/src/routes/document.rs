//! Document intake + retrieval storage (spec §6 `/document/upload`,
//! `/document/status/{task_id}`, internal `/document/internal/file/{name}`,
//! `/document/internal/store-vectors`).

use crate::db::{ChatStore as _, DocumentRecord, DocumentStore, VectorRow, VectorStore};
use crate::error::ServerError;
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
pub struct DocumentUploadResponse {
    pub document_id: String,
    #[serde(rename = "ragTaskId", skip_serializing_if = "Option::is_none")]
    pub rag_task_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub status: &'static str,
    pub progress: u8,
    pub message: String,
}

/// `TaskStatus` carries no `ToSchema` impl (it lives in the dependency-free
/// `slab-types` crate), so the HTTP layer maps it to a label itself.
pub fn task_status_label(status: slab_types::TaskStatus) -> &'static str {
    match status {
        slab_types::TaskStatus::Pending => "pending",
        slab_types::TaskStatus::Processing => "processing",
        slab_types::TaskStatus::Completed => "completed",
        slab_types::TaskStatus::Failed => "failed",
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StoreVectorsRequest {
    pub embeddings: Vec<Vec<f32>>,
    pub texts: Vec<String>,
    pub metadatas: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StoreVectorsResponse {
    pub message: String,
}

#[derive(OpenApi)]
#[openapi(paths(upload_document, document_status, document_internal_file, store_vectors))]
pub struct DocumentApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/document/upload", post(upload_document))
        .route("/document/status/{task_id}", get(document_status))
        .route("/document/internal/file/{name}", get(document_internal_file))
        .route("/document/internal/store-vectors", post(store_vectors))
}

#[utoipa::path(post, path = "/document/upload", responses((status = 200, body = DocumentUploadResponse)))]
async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<DocumentUploadResponse>, ServerError> {
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

    let document_id = Uuid::new_v4().to_string();
    let stored_name = format!("{document_id}_{file_name}");
    tokio::fs::create_dir_all(&state.config.document_storage_dir)
        .await
        .map_err(|e| ServerError::Internal(format!("create document storage dir: {e}")))?;
    let file_path = format!("{}/{}", state.config.document_storage_dir.trim_end_matches('/'), stored_name);
    tokio::fs::write(&file_path, &bytes).await.map_err(|e| ServerError::Internal(format!("write document: {e}")))?;

    let task_id = state.broker.submit(task_name::INGEST, serde_json::json!({ "source": stored_name })).await?;

    state
        .store
        .create_document(&DocumentRecord {
            document_id: document_id.clone(),
            file_name,
            file_path,
            rag_task_id: Some(task_id.clone()),
            created_at: Utc::now(),
        })
        .await?;

    Ok(Json(DocumentUploadResponse { document_id, rag_task_id: Some(task_id) }))
}

#[utoipa::path(
    get,
    path = "/document/status/{task_id}",
    params(("task_id" = String, Path)),
    responses((status = 200, body = TaskStatusResponse))
)]
async fn document_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ServerError> {
    let record = state.progress.read(TaskKind::Ingest, &task_id).await?;
    Ok(Json(TaskStatusResponse { status: task_status_label(record.status), progress: record.percent, message: record.message }))
}

#[utoipa::path(
    get,
    path = "/document/internal/file/{name}",
    params(("name" = String, Path)),
    responses((status = 200, description = "raw file bytes"))
)]
async fn document_internal_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Bytes, ServerError> {
    read_stored_file(&state.config.document_storage_dir, &name).await
}

async fn read_stored_file(dir: &str, name: &str) -> Result<Bytes, ServerError> {
    if name.contains("..") || name.contains('/') {
        return Err(ServerError::BadRequest("invalid file name".to_string()));
    }
    let path = format!("{}/{}", dir.trim_end_matches('/'), name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Bytes::from(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ServerError::NotFound(format!("{name} not found"))),
        Err(e) => Err(ServerError::Internal(format!("read {name}: {e}"))),
    }
}

/// `POST /document/internal/store-vectors` (spec §6). Unequal array lengths
/// are a validation error, not stored partially.
#[utoipa::path(
    post,
    path = "/document/internal/store-vectors",
    request_body = StoreVectorsRequest,
    responses((status = 200, body = StoreVectorsResponse), (status = 400, description = "mismatched array lengths"))
)]
async fn store_vectors(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StoreVectorsRequest>,
) -> Result<Json<StoreVectorsResponse>, ServerError> {
    if req.embeddings.len() != req.texts.len() || req.texts.len() != req.metadatas.len() {
        return Err(ServerError::BadRequest("embeddings, texts, and metadatas must have equal length".to_string()));
    }
    let rows: Vec<VectorRow> = req
        .embeddings
        .into_iter()
        .zip(req.texts)
        .zip(req.metadatas)
        .map(|((embedding, text), metadata)| VectorRow { text, embedding, metadata })
        .collect();
    let total = rows.len();
    let inserted = state.store.insert_vectors(&rows).await?;
    Ok(Json(StoreVectorsResponse { message: format!("stored {inserted} of {total} vectors") }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_traversal_in_internal_file_name() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let result = rt.block_on(read_stored_file("/tmp", "../etc/passwd"));
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }
}
