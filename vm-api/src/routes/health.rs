use crate::state::AppState;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "vm-api",
    responses((status = 200, description = "Service is running"))
)]
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "vm-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
