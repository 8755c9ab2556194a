//! `GET /chat/sessions/{session_id}/messages`,
//! `POST /ai/sessions/{session_id}/update-summary` (spec §6, §4.7).

use crate::db::ChatStore;
use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use slab_types::{config::task_name, Role};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageView {
    pub sender: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionMessagesResponse {
    pub summary: Option<String>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSummaryRequest {
    pub oldest_message_ids: Vec<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateSummaryResponse {
    pub status: &'static str,
    pub task_id: String,
}

#[derive(OpenApi)]
#[openapi(paths(get_session_messages, update_summary))]
pub struct SessionsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat/sessions/{session_id}/messages", get(get_session_messages))
        .route("/ai/sessions/{session_id}/update-summary", post(update_summary))
}

fn sender_label(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[utoipa::path(
    get,
    path = "/chat/sessions/{session_id}/messages",
    params(("session_id" = String, Path)),
    responses((status = 200, body = SessionMessagesResponse))
)]
async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionMessagesResponse>, ServerError> {
    let summary = state.store.get_summary(&session_id).await?;
    let messages = state.store.list_messages(&session_id).await?;
    Ok(Json(SessionMessagesResponse {
        summary,
        messages: messages.into_iter().map(|m| MessageView { sender: sender_label(m.role), content: m.content }).collect(),
    }))
}

/// Manually triggers a re-summary task over the given message ids, distinct
/// from the automatic eviction triggered by [`slab_session::SessionCache::append`]
/// at `RESUMMARIZE_THRESHOLD` (spec §4.7 "Re-summary task"; see DESIGN.md for
/// how the `update-summary` consumer distinguishes the two payload shapes).
#[utoipa::path(
    post,
    path = "/ai/sessions/{session_id}/update-summary",
    params(("session_id" = String, Path)),
    request_body = UpdateSummaryRequest,
    responses((status = 200, body = UpdateSummaryResponse))
)]
async fn update_summary(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<UpdateSummaryRequest>,
) -> Result<Json<UpdateSummaryResponse>, ServerError> {
    if req.oldest_message_ids.is_empty() {
        return Err(ServerError::BadRequest("oldest_message_ids must not be empty".to_string()));
    }
    let task_id = state
        .broker
        .submit(
            task_name::UPDATE_SUMMARY,
            serde_json::json!({ "session_id": session_id, "oldest_message_ids": req.oldest_message_ids }),
        )
        .await?;
    Ok(Json(UpdateSummaryResponse { status: "queued", task_id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_label_matches_role() {
        assert_eq!(sender_label(Role::User), "user");
        assert_eq!(sender_label(Role::Assistant), "assistant");
    }
}
