//! Router and request helpers over the shared in-process fakes

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use mediafetch::core::testing::{test_orchestrator, FakeExtractor};
use mediafetch::ratelimit::AdmissionGate;
use mediafetch::server::{router, AppState};
use std::path::Path;
use std::sync::Arc;

pub use mediafetch::core::testing::scratch_entries;

pub const API_KEY: &str = "secret123";

pub fn app(scratch_root: &Path, limiter: Arc<dyn AdmissionGate>, api_key: Option<&str>) -> Router {
    let orchestrator = Arc::new(test_orchestrator(FakeExtractor::new(), scratch_root));
    let state = AppState::new(orchestrator, limiter).with_api_key(api_key.map(str::to_string));
    router(state)
}

pub fn post_json(uri: &str, body: serde_json::Value, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
