use crate::error::AppError;
use crate::routes::Authenticated;
use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use gateway_core::GatewayError;
use std::sync::Arc;

/// `GET /v1/me/usage`: aggregates for the calling key.
pub async fn my_usage(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
) -> Result<impl IntoResponse, AppError> {
    let usage = state
        .audit
        .usage_for(&auth.api_key_id)
        .await
        .map_err(|e| AppError::new(GatewayError::Internal(e.to_string())))?;
    Ok(Json(usage))
}
