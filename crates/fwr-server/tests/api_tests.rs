//! HTTP ingress tests driven through the router with `oneshot`

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::*;
use fwr_server::{api::router, events::S3Event};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(harness: Harness) -> (Router, Harness) {
    (router(harness.state()), harness)
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app(Harness::new());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!({ "status": "OK" }));
}

#[tokio::test]
async fn test_upload_event_processes_release() {
    let (app, harness) = app(Harness::new());
    harness.upload("incoming/release v2.zip", valid_release());
    let event = serde_json::to_value(S3Event::for_object(BUCKET, "incoming/release v2.zip")).unwrap();

    let (status, body) = post(app, "/events/uploaded", event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcomes"][0]["outcome"], "processed");
    assert_eq!(body["outcomes"][0]["original_name"], "release v2.zip");
    assert_eq!(body["outcomes"][0]["record"]["product_id"], "ctrl-4ch");
    assert!(harness.keys()[0].starts_with("processed/"));
}

#[tokio::test]
async fn test_rejected_artifact_is_unprocessable() {
    let (app, harness) = app(Harness::new());
    harness.upload("incoming/release.zip", tampered_release());
    let event = serde_json::to_value(S3Event::for_object(BUCKET, "incoming/release.zip")).unwrap();

    let (status, body) = post(app, "/events/uploaded", event).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "hash_mismatch");
    assert!(body["error"]["message"].as_str().unwrap().contains("firmware.bin"));
    assert_eq!(harness.records.all().len(), 1);
}

#[tokio::test]
async fn test_infrastructure_failure_is_server_error() {
    let (app, harness) = app(Harness::new());
    harness.records.fail_puts(true);
    harness.upload("incoming/release.zip", valid_release());
    let event = serde_json::to_value(S3Event::for_object(BUCKET, "incoming/release.zip")).unwrap();

    let (status, body) = post(app, "/events/uploaded", event).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["kind"], "persistence");
}

#[tokio::test]
async fn test_event_without_records_is_bad_request() {
    let (app, _) = app(Harness::new());

    let (status, body) = post(app, "/events/uploaded", json!({ "Records": [] })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "bad_request");
}

#[tokio::test]
async fn test_delete_event_marks_record() {
    let (app, harness) = app(Harness::new());
    let upload = harness.upload("incoming/release.zip", valid_release());
    harness.uploads.process(&upload).await.unwrap();
    let processed_key = harness.keys().remove(0);

    let event = json!({
        "Records": [{
            "eventName": "ObjectRemoved:Delete",
            "s3": {
                "bucket": { "name": BUCKET },
                "object": { "key": processed_key }
            }
        }]
    });
    let (status, body) = post(app, "/events/deleted", event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcomes"][0]["outcome"], "reconciled");
    assert_eq!(body["outcomes"][0]["marked"].as_array().unwrap().len(), 1);
    assert!(harness.records.all()[0].deleted);
}
