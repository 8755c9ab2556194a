//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `SLAB_ENABLE_SWAGGER=false`)
//! - Health route
//! - Chat, session, document, image, meeting, ai, admin routes

mod admin;
mod ai;
mod chat;
pub mod doc;
mod document;
mod health;
mod image;
mod meeting;
mod sessions;

use crate::middleware::TraceLayer;
use crate::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa_swagger_ui::SwaggerUi;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    // Default allows all origins. In production, restrict via SLAB_CORS_ORIGINS.
    let cors = if let Some(origins_str) = &state.config.cors_allowed_origins {
        let origins: Vec<axum::http::HeaderValue> = origins_str.split(',').filter_map(|s| s.trim().parse().ok()).collect();
        if origins.is_empty() {
            CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any)
        } else {
            CorsLayer::new().allow_origin(origins).allow_headers(Any).allow_methods(Any)
        }
    } else {
        CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any)
    };

    let api_router = Router::new()
        .merge(health::router())
        .merge(chat::router())
        .merge(sessions::router())
        .merge(document::router())
        .merge(image::router())
        .merge(meeting::router())
        .merge(ai::router())
        .merge(admin::router());

    let mut app = Router::new().merge(api_router);

    let api_doc = doc::get_docs();
    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_doc));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(TraceLayer::new(Arc::clone(&state)))
        .layer(cors)
        .with_state(state)
}
