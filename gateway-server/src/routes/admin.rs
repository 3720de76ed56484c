use crate::error::AppError;
use crate::routes::{require_admin, Authenticated};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use gateway_core::GatewayError;
use gateway_policy::PolicySnapshot;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

impl Page {
    /// Simple `limit`/`offset` pagination, capped at 500 — no cursor
    /// tokens for this thin admin surface.
    fn bounds(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(100).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// `GET /v1/admin/keys` (admin).
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    let (limit, offset) = page.bounds();
    let keys = state
        .auth
        .store()
        .list(limit, offset)
        .await
        .map_err(|e| AppError::new(GatewayError::Internal(e.to_string())))?;
    let view: Vec<_> = keys
        .into_iter()
        .map(|k| {
            json!({
                "id": k.id,
                "role": k.role,
                "active": k.active,
                "quota_monthly": k.quota_monthly,
                "quota_used": k.quota_used,
                "label": k.label,
                "created_at": k.created_at,
                "disabled_at": k.disabled_at,
            })
        })
        .collect();
    Ok(Json(json!({ "keys": view })))
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyBody {
    pub key: String,
    pub role: Option<String>,
    pub quota_monthly: Option<i64>,
    pub label: Option<String>,
}

/// `POST /v1/admin/keys` (admin): provisions a new API key.
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    Json(body): Json<CreateKeyBody>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    state
        .auth
        .store()
        .create(&body.key, body.role.as_deref(), body.quota_monthly, body.label.as_deref())
        .await
        .map_err(|e| AppError::new(GatewayError::Internal(e.to_string())))?;
    Ok(Json(json!({ "created": true })))
}

#[derive(Debug, Deserialize)]
pub struct DisableKeyBody {
    pub key: String,
}

/// `POST /v1/admin/keys/disable` (admin): soft-disables a key.
pub async fn disable_key(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    Json(body): Json<DisableKeyBody>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    let disabled = state
        .auth
        .store()
        .disable(&body.key)
        .await
        .map_err(|e| AppError::new(GatewayError::Internal(e.to_string())))?;
    if !disabled {
        return Err(AppError::new(GatewayError::NotFound));
    }
    Ok(Json(json!({ "disabled": true })))
}

/// `GET /v1/admin/logs` (admin): recent audit rows.
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    let (limit, offset) = page.bounds();
    let rows = state
        .audit
        .recent(limit, offset)
        .await
        .map_err(|e| AppError::new(GatewayError::Internal(e.to_string())))?;
    Ok(Json(json!({ "logs": rows })))
}

/// `GET /v1/admin/usage` (admin): usage for an arbitrary key.
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub api_key_id: String,
}

pub async fn usage_for_key(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    Query(q): Query<UsageQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    let usage = state
        .audit
        .usage_for(&q.api_key_id)
        .await
        .map_err(|e| AppError::new(GatewayError::Internal(e.to_string())))?;
    Ok(Json(usage))
}

/// `GET /v1/admin/stats` (admin): process-wide counters, thin passthrough
/// of the Prometheus registry for a human-readable summary.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    let guard = state.registry.read().expect("registry lock poisoned");
    let models = guard.as_ref().map(|r| r.status()).unwrap_or_default();
    Ok(Json(json!({ "models": models, "kv_enabled": state.cache.kv_enabled() })))
}

/// `GET /v1/admin/policy` (admin): inspect the live policy snapshot.
pub async fn get_policy(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    let snapshot = state.policy_snapshot();
    Ok(Json(policy_view(&snapshot)))
}

/// `POST /v1/admin/policy/reload` (admin): re-reads
/// `POLICY_DECISION_PATH` and atomically swaps the live snapshot.
pub async fn reload_policy(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    let snapshot = PolicySnapshot::load_from_env();
    let view = policy_view(&snapshot);
    state.replace_policy(snapshot);
    Ok(Json(view))
}

fn policy_view(snapshot: &PolicySnapshot) -> serde_json::Value {
    match snapshot {
        PolicySnapshot::NotConfigured => json!({ "state": "not_configured" }),
        PolicySnapshot::FailClosed { reason } => json!({ "state": "fail_closed", "reason": reason }),
        PolicySnapshot::Loaded(decision) => json!({ "state": "loaded", "decision": decision }),
    }
}
