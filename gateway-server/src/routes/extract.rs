use crate::coordinator::{self, ExtractRequest};
use crate::error::AppError;
use crate::routes::{client_host, Authenticated, ValidatedJson};
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use gateway_core::{GatewayError, Route};
use gateway_model::backend::GenerationParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ExtractBody {
    pub schema_id: String,
    pub text: String,
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default = "default_true")]
    pub repair: bool,
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ExtractResponseBody {
    pub schema_id: String,
    pub model: String,
    pub data: Value,
    pub cached: bool,
    pub repair_attempted: bool,
    pub request_id: String,
}

/// `POST /v1/extract`.
pub async fn extract(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<ExtractBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.text.trim().is_empty() {
        return Err(AppError::new(GatewayError::ValidationError { fields: vec!["text".to_string()] }));
    }
    let schema = state
        .schema(&body.schema_id)
        .ok_or_else(|| AppError::new(GatewayError::JsonSchemaMissing(body.schema_id.clone())))?;

    let host = client_host(&headers);
    let ctx = gateway_core::RequestCtx::new(Route::Extract);
    let params = GenerationParams {
        max_new_tokens: body.max_new_tokens,
        temperature: body.temperature,
        top_p: None,
        top_k: None,
        stop: None,
    };
    let req = ExtractRequest {
        schema_id: body.schema_id,
        text: body.text,
        model: body.model,
        cache: body.cache,
        repair: body.repair,
        params,
    };

    let resp = coordinator::extract(&state, &ctx, &auth, &host, &schema, req)
        .await
        .map_err(|e| AppError::with_request_id(e, ctx.request_id.to_string()))?;

    Ok(Json(ExtractResponseBody {
        schema_id: resp.schema_id,
        model: resp.model,
        data: resp.data,
        cached: resp.cached,
        repair_attempted: resp.repair_attempted,
        request_id: ctx.request_id.to_string(),
    }))
}
