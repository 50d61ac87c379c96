//! Request handlers.

pub mod auth;
pub mod catalog;
pub mod groups;
pub mod password;
pub mod users;

use axum::Json;

use crate::models::HealthResponse;

/// `GET /health`: liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: keyward_core::version(),
    })
}
