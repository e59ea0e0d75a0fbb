use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe with a fixed body
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "OK" })))
}
