mod listener;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use crate::hub::tests::ScriptedActuator;
use crate::hub::HubServices;
use crate::models::AppConfig;
use crate::modules::persistence::Store;
use crate::server::{build_router, AppState};

pub(super) fn test_router(store: &Store) -> (Router, AppState) {
    let mut config = AppConfig::default();
    config.reclaim.rescan_enabled = false;
    let hub = HubServices::build(
        &config,
        store.clone(),
        Arc::new(ScriptedActuator::new(vec![])),
    );
    let state = AppState::new(hub);
    (
        build_router(state.clone(), config.server.max_body_bytes),
        state,
    )
}

/// Sends one request through the router and decodes the JSON reply.
pub(super) async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

pub(super) fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request build")
}

pub(super) fn json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request build")
}
