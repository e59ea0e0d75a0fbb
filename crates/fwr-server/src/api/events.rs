//! Handlers for S3 event notifications
//!
//! Records are processed in order. A failure in any of them makes the
//! whole request fail so the notifier's retry accounting sees it.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::AppState;
use crate::error::AppError;
use crate::events::S3Event;

pub async fn uploaded(
    State(state): State<AppState>,
    Json(event): Json<S3Event>,
) -> Result<Json<Value>, AppError> {
    let objects = event.objects()?;
    let outcomes = state.uploads.process_all(&objects).await?;
    Ok(Json(json!({ "outcomes": outcomes })))
}

pub async fn deleted(
    State(state): State<AppState>,
    Json(event): Json<S3Event>,
) -> Result<Json<Value>, AppError> {
    let objects = event.objects()?;
    let outcomes = state.deletions.reconcile_all(&objects).await?;
    Ok(Json(json!({ "outcomes": outcomes })))
}
