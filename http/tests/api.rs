// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Router-level tests over the HTTP surface, exercised with
//! `tower::ServiceExt::oneshot` rather than a bound socket.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use prismq_http::{server, state::AppState, ApiKeyStore};
use prismq_store::Store;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> axum::Router {
    let store = Store::open_in_memory().unwrap();
    let state = AppState { store };
    server::create_router(state, Arc::new(ApiKeyStore::disabled()))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok_on_a_fresh_store() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn enqueue_then_fetch_round_trips_the_task() {
    let app = app();

    let enqueue_response = app
        .clone()
        .oneshot(
            Request::post("/queue/enqueue")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"type": "t.ok", "payload": {"n": 1}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(enqueue_response.status(), StatusCode::CREATED);
    let created = body_json(enqueue_response).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["status"], "queued");

    let get_response = app
        .clone()
        .oneshot(
            Request::get(format!("/queue/tasks/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);
    let fetched = body_json(get_response).await;
    assert_eq!(fetched["id"], id);
    assert_eq!(fetched["type"], "t.ok");
}

#[tokio::test]
async fn enqueue_rejects_empty_type() {
    let response = app()
        .oneshot(
            Request::post("/queue/enqueue")
                .header("content-type", "application/json")
                .body(Body::from(json!({"type": "", "payload": {}}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn idempotency_key_collision_returns_the_same_task_id() {
    let app = app();
    let body = json!({"type": "t.ok", "payload": {}, "idempotency_key": "dup-1"}).to_string();

    let first = app
        .clone()
        .oneshot(
            Request::post("/queue/enqueue")
                .header("content-type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    let first_id = body_json(first).await["id"].as_i64().unwrap();

    let second = app
        .clone()
        .oneshot(
            Request::post("/queue/enqueue")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_id = body_json(second).await["id"].as_i64().unwrap();
    assert_eq!(first_id, second_id);
}

#[tokio::test]
async fn getting_an_unknown_task_is_404() {
    let response = app()
        .oneshot(Request::get("/queue/tasks/999999").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_is_idempotent_and_returns_200_both_times() {
    let app = app();
    let enqueue_response = app
        .clone()
        .oneshot(
            Request::post("/queue/enqueue")
                .header("content-type", "application/json")
                .body(Body::from(json!({"type": "t.ok", "payload": {}}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let id = body_json(enqueue_response).await["id"].as_i64().unwrap();

    let first_cancel = app
        .clone()
        .oneshot(
            Request::post(format!("/queue/tasks/{id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first_cancel.status(), StatusCode::OK);

    let second_cancel = app
        .clone()
        .oneshot(
            Request::post(format!("/queue/tasks/{id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second_cancel.status(), StatusCode::OK);
    let body = body_json(second_cancel).await;
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn stats_reports_depth_by_status_and_type() {
    let app = app();
    app.clone()
        .oneshot(
            Request::post("/queue/enqueue")
                .header("content-type", "application/json")
                .body(Body::from(json!({"type": "sources.youtube", "payload": {}}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let stats_response = app
        .oneshot(Request::get("/queue/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(stats_response.status(), StatusCode::OK);
    let body = body_json(stats_response).await;
    assert!(body["depth_by_status"].as_array().unwrap().iter().any(|row| row["status"] == "queued"));
    assert!(body["depth_by_type"]
        .as_array()
        .unwrap()
        .iter()
        .any(|row| row["type"] == "sources.youtube" && row["status"] == "queued"));
}

#[tokio::test]
async fn unauthenticated_request_is_rejected_when_api_keys_are_configured() {
    let store = Store::open_in_memory().unwrap();
    let state = AppState { store };
    let app = server::create_router(state, Arc::new(ApiKeyStore::new("secret-key", 60)));

    let response = app
        .oneshot(Request::get("/queue/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
