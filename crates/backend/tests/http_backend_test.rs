//! HttpBackend against a local stand-in for the task API.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use slackrelay_backend::{BackendApi, BackendError, HttpBackend};
use slackrelay_core::types::Role;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

type Submitted = Arc<Mutex<Vec<Value>>>;

async fn submit(State(log): State<Submitted>, Json(body): Json<Value>) -> StatusCode {
    let reject = body["message"] == "reject me";
    log.lock().unwrap().push(body);
    if reject {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn state() -> Json<Value> {
    Json(json!({
        "history": [
            {"message": {"role": "user", "content": "what is 6 x 7?"}},
            {"message": {"role": "assistant", "content": "42"}}
        ],
        "isProcessing": false,
        "queueLength": 0
    }))
}

async fn garbage() -> &'static str {
    "not json"
}

async fn start_stand_in() -> (String, Submitted) {
    let log: Submitted = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/message", post(submit))
        .route("/api/state", get(state))
        .route("/api/garbage", get(garbage))
        .with_state(log.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), log)
}

fn backend(base: &str, state_path: &str) -> HttpBackend {
    HttpBackend::new(base, "/api/message", state_path, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn submit_posts_message_body() {
    let (base, log) = start_stand_in().await;
    backend(&base, "/api/state").submit("hello").await.unwrap();

    let bodies = log.lock().unwrap().clone();
    assert_eq!(bodies, vec![json!({ "message": "hello" })]);
}

#[tokio::test]
async fn rejected_submission_carries_status_and_body() {
    let (base, _log) = start_stand_in().await;
    let err = backend(&base, "/api/state").submit("reject me").await.unwrap_err();
    assert!(matches!(err, BackendError::ApiError { status: 503, .. }));
}

#[tokio::test]
async fn query_state_decodes_history() {
    let (base, _log) = start_stand_in().await;
    let state = backend(&base, "/api/state").query_state().await.unwrap();

    assert_eq!(state.history.len(), 2);
    assert_eq!(state.history[1].message.role, Role::Assistant);
    assert_eq!(state.history[1].assistant_content(), Some("42"));
    assert!(state.is_idle());
}

#[tokio::test]
async fn undecodable_state_is_a_decode_error() {
    let (base, _log) = start_stand_in().await;
    let err = backend(&base, "/api/garbage").query_state().await.unwrap_err();
    assert!(matches!(err, BackendError::DecodeError(_)));
}

#[tokio::test]
async fn missing_route_is_an_api_error() {
    let (base, _log) = start_stand_in().await;
    let err = backend(&base, "/api/nowhere").query_state().await.unwrap_err();
    assert!(matches!(err, BackendError::ApiError { status: 404, .. }));
}
