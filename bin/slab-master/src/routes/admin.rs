//! `GET /admin/gpu` — GPU arbiter snapshot (SPEC_FULL.md §C "health /
//! monitoring surface"; not in spec.md's own route table, supplemented from
//! `original_source/`'s GPU manager introspection).

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

#[derive(Debug, Serialize, ToSchema)]
pub struct GpuStateView {
    pub active_model: Option<&'static str>,
    pub batch_count: u32,
    pub last_activity_ts: i64,
}

#[derive(OpenApi)]
#[openapi(paths(get_gpu))]
pub struct AdminApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/admin/gpu", get(get_gpu))
}

fn check_admin_token(state: &AppState, headers: &HeaderMap) -> Result<(), ServerError> {
    let Some(expected) = state.config.admin_api_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ServerError::Unauthorized("missing or invalid admin token".to_string()))
    }
}

#[utoipa::path(get, path = "/admin/gpu", responses((status = 200, body = GpuStateView), (status = 401, description = "missing or invalid admin token")))]
async fn get_gpu(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<GpuStateView>, ServerError> {
    check_admin_token(&state, &headers)?;
    let snapshot = state.arbiter.snapshot().await?;
    Ok(Json(GpuStateView {
        active_model: snapshot.active_model.map(|k| k.as_str()),
        batch_count: snapshot.batch_count,
        last_activity_ts: snapshot.last_activity_ts,
    }))
}
