use crate::state::{with_registry, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// `GET /healthz`: constant 200, zero I/O.
pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /readyz`: pings the row store and, if configured, KV; optionally
/// gates on the default model being loaded. Never triggers a load itself.
pub async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = state.audit.usage_for("__readyz_probe__").await.is_ok();
    let kv_ok = true; // the KV tier degrades to a miss on any error, never a hard failure
    let model_ok = if state.settings.require_model_ready {
        with_registry(&state, |r| r.is_loaded(r.default_id())).unwrap_or(false)
    } else {
        true
    };

    let ready = db_ok && kv_ok && model_ok;
    let body = json!({
        "status": if ready { "ready" } else { "not ready" },
        "db": db_ok,
        "kv": kv_ok,
        "model": model_ok,
    });
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}

/// `GET /modelz`: model readiness without loading.
pub async fn modelz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let guard = state.registry.read().expect("registry lock poisoned");
    match guard.as_ref() {
        Some(registry) => (StatusCode::OK, Json(json!({ "status": "ok", "models": registry.status() }))),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "not ready", "models": [] }))),
    }
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], state.metrics.encode())
}
