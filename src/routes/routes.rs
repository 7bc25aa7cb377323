//! Defines the HTTP surface of the upload gateway.
//!
//! ## Structure
//! - `GET  /api/health/` — liveness, public
//! - `POST /api/upload/` — multipart upload, bearer token required
//! - `GET  /api/files/`  — caller's objects, bearer token required
//!
//! The auth middleware wraps the whole router, so unknown paths are also
//! rejected with 401 unless they fall under a public prefix.

use crate::{
    handlers::{
        file_handlers::{MAX_BODY_BYTES, list_files, upload_file},
        health_handlers::health,
    },
    middleware::auth::authenticate,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the application router with `state` attached.
pub fn routes(state: AppState) -> Router {
    let api = Router::new()
        .route("/health/", get(health))
        .route("/upload/", post(upload_file))
        .route("/files/", get(list_files));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
