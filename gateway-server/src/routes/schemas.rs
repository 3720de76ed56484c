use crate::error::AppError;
use crate::routes::Authenticated;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use gateway_core::GatewayError;
use serde_json::json;
use std::sync::Arc;

/// `GET /v1/schemas`: summaries of every registered schema.
pub async fn list_schemas(State(state): State<Arc<AppState>>, Authenticated(_auth): Authenticated) -> impl IntoResponse {
    let schemas: Vec<_> = state
        .schemas
        .values()
        .map(|s| json!({ "schema_id": s.id.to_string(), "summary": s.summary() }))
        .collect();
    Json(json!({ "schemas": schemas }))
}

/// `GET /v1/schemas/{id}`: the raw schema document.
pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    Authenticated(_auth): Authenticated,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let schema = state.schema(&id).ok_or_else(|| AppError::new(GatewayError::NotFound))?;
    Ok(Json(schema.document.clone()))
}
