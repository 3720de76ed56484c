use crate::coordinator::{self, GenerateRequest};
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
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct GenerateResponseBody {
    pub model: String,
    pub output: String,
    pub cached: bool,
    pub request_id: String,
}

/// `POST /v1/generate`.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<GenerateBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.prompt.trim().is_empty() {
        return Err(AppError::new(GatewayError::ValidationError { fields: vec!["prompt".to_string()] }));
    }

    let host = client_host(&headers);
    let ctx = gateway_core::RequestCtx::new(Route::Generate);
    let one = run_one(&state, &ctx, &auth, &host, body.prompt, body.model, body.cache, &GenerationParams {
        max_new_tokens: body.max_new_tokens,
        temperature: body.temperature,
        top_p: body.top_p,
        top_k: body.top_k,
        stop: body.stop,
    })
    .await
    .map_err(|e| AppError::with_request_id(e, ctx.request_id.to_string()))?;

    Ok(Json(GenerateResponseBody {
        model: one.model,
        output: one.output,
        cached: one.cached,
        request_id: ctx.request_id.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct GenerateBatchBody {
    pub prompts: Vec<String>,
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Ok { model: String, output: String, cached: bool },
    Err { code: String, message: String },
}

#[derive(Debug, Serialize)]
pub struct GenerateBatchResponseBody {
    pub results: Vec<BatchItem>,
    pub request_id: String,
}

/// `POST /v1/generate/batch`: same params as `/v1/generate` with
/// `prompts: []`, processed in order; one item's failure does not abort
/// the rest of the batch.
pub async fn generate_batch(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<GenerateBatchBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.prompts.is_empty() {
        return Err(AppError::new(GatewayError::ValidationError { fields: vec!["prompts".to_string()] }));
    }

    let host = client_host(&headers);
    let ctx = gateway_core::RequestCtx::new(Route::GenerateBatch);
    let params = GenerationParams {
        max_new_tokens: body.max_new_tokens,
        temperature: body.temperature,
        top_p: body.top_p,
        top_k: body.top_k,
        stop: body.stop,
    };

    let mut results = Vec::with_capacity(body.prompts.len());
    for prompt in body.prompts {
        let item = match run_one(&state, &ctx, &auth, &host, prompt, body.model.clone(), body.cache, &params).await {
            Ok(one) => BatchItem::Ok { model: one.model, output: one.output, cached: one.cached },
            Err(e) => BatchItem::Err { code: e.code().to_string(), message: e.to_string() },
        };
        results.push(item);
    }

    Ok(Json(GenerateBatchResponseBody { results, request_id: ctx.request_id.to_string() }))
}

struct OneResult {
    model: String,
    output: String,
    cached: bool,
}

async fn run_one(
    state: &AppState,
    ctx: &gateway_core::RequestCtx,
    auth: &gateway_auth::AuthContext,
    host: &str,
    prompt: String,
    model: Option<String>,
    cache: bool,
    params: &GenerationParams,
) -> Result<OneResult, GatewayError> {
    let req = GenerateRequest { prompt, model, cache, params: params.clone() };
    let resp = coordinator::generate(state, ctx, auth, host, req).await?;
    Ok(OneResult { model: resp.model, output: resp.output, cached: resp.cached })
}

