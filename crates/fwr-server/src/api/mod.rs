//! HTTP ingress: liveness probe and S3 event endpoints

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::pipeline::{DeletionReconciler, UploadProcessor};

pub mod events;
pub mod health;

#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadProcessor>,
    pub deletions: Arc<DeletionReconciler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/events/uploaded", post(events::uploaded))
        .route("/events/deleted", post(events::deleted))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                ),
        )
}
