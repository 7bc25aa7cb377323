//! Health handler.
//!
//! - GET /api/health/ -> liveness, never touches storage

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// `GET /api/health/`
///
/// Always returns 200 OK. Reachable without a token.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            message: "File upload service is running",
        }),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}
