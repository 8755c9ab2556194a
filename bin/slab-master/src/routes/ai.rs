//! `POST /ai/chat/generate`, `GET /ai/tasks/{task_id}` (spec §6). Backs
//! `slab_pipelines::MasterClient::generate_and_await_completion`, used by
//! the Worker's STT runner for meeting summaries — a single LLM completion,
//! not a streamed chat turn, so it bypasses the orchestrator and
//! `TaskKind`/`ProgressReporter` entirely and instead polls a dedicated
//! `llm_result:{id}` KV record (spec §6 "KV key layout").

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use slab_kv::KvJsonExt;
use slab_types::config::LLM_RESULT_TTL;
use std::sync::Arc;
use tracing::warn;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

fn result_key(task_id: &str) -> String {
    format!("llm_result:{task_id}")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmTaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LlmTaskRecord {
    pub status: LlmTaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResponse {
    pub task_id: String,
}

#[derive(OpenApi)]
#[openapi(paths(generate, get_task))]
pub struct AiApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ai/chat/generate", post(generate)).route("/ai/tasks/{task_id}", get(get_task))
}

#[utoipa::path(post, path = "/ai/chat/generate", request_body = GenerateRequest, responses((status = 200, body = GenerateResponse)))]
async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServerError> {
    if req.message.trim().is_empty() {
        return Err(ServerError::BadRequest("message must not be empty".to_string()));
    }
    let task_id = Uuid::new_v4().to_string();
    let pending = LlmTaskRecord { status: LlmTaskStatus::Pending, result: None, error: None };
    state.kv.set_json(&result_key(&task_id), &pending, Some(LLM_RESULT_TTL)).await?;

    let kv = state.kv.clone();
    let llm = state.llm.clone();
    let message = req.message.clone();
    let spawned_task_id = task_id.clone();
    tokio::spawn(async move {
        let processing = LlmTaskRecord { status: LlmTaskStatus::Processing, result: None, error: None };
        if let Err(e) = kv.set_json(&result_key(&spawned_task_id), &processing, Some(LLM_RESULT_TTL)).await {
            warn!(task_id = %spawned_task_id, error = %e, "failed to mark llm task processing");
        }
        let record = match llm.complete(None, &message).await {
            Ok(result) => LlmTaskRecord { status: LlmTaskStatus::Completed, result: Some(result), error: None },
            Err(e) => LlmTaskRecord { status: LlmTaskStatus::Failed, result: None, error: Some(e.to_string()) },
        };
        if let Err(e) = kv.set_json(&result_key(&spawned_task_id), &record, Some(LLM_RESULT_TTL)).await {
            warn!(task_id = %spawned_task_id, error = %e, "failed to record llm task result");
        }
    });

    Ok(Json(GenerateResponse { task_id }))
}

#[utoipa::path(
    get,
    path = "/ai/tasks/{task_id}",
    params(("task_id" = String, Path)),
    responses((status = 200, body = LlmTaskRecord), (status = 404, description = "unknown task id"))
)]
async fn get_task(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Result<Json<LlmTaskRecord>, ServerError> {
    match state.kv.get_json::<LlmTaskRecord>(&result_key(&task_id)).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ServerError::NotFound(format!("no llm task {task_id}"))),
    }
}
