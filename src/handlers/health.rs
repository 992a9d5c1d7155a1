use axum::{response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up")),
    tag = "Health"
)]
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
