//! Common test utilities and helpers for vm-api tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use vm_orchestrator::test_utils::{create_test_orchestrator, test_config, TestHarness};

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: Response<Body>) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

/// Body of a `create` command for a VM with a database.
pub fn create_command(vm_name: &str, db_name: &str) -> Value {
    json!({
        "action": "create",
        "vm_name": vm_name,
        "db_name": db_name,
        "db_user": "appuser",
        "db_password": "secret"
    })
}

/// Router over in-memory backends, with handles to inspect them.
pub struct TestClient {
    pub app: Router,
    pub backends: TestHarness,
}

impl TestClient {
    pub fn new() -> Self {
        Self::with_harness(create_test_orchestrator(test_config()))
    }

    pub fn with_harness(backends: TestHarness) -> Self {
        let app = vm_api::create_app(backends.orchestrator.clone());
        Self { app, backends }
    }

    pub async fn send_request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Post a raw body to an endpoint as JSON
    pub async fn post_raw(&self, uri: &str, body: impl Into<Body>) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        self.send_request(request).await
    }

    pub async fn post<T: serde::Serialize>(&self, uri: &str, body: &T) -> Response<Body> {
        let body = serde_json::to_string(body).expect("Failed to serialize request body");
        self.post_raw(uri, body).await
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send_request(request).await
    }
}
