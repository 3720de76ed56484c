use crate::state::{with_registry, AppState};
use gateway_auth::AuthContext;
use gateway_cache::{
    fingerprint::{prompt_hash, prompt_hash_extract, CacheKind},
    params_fingerprint, redis_key,
};
use gateway_core::{Cap, GatewayError, LoadMode, RequestCtx, Result};
use gateway_extract::{run_extraction, Schema};
use gateway_model::backend::{GenerationParams, SharedBackend};
use gateway_telemetry::InferenceLog;
use serde_json::Value;
use std::time::Instant;

/// Resolves the backend for `model_id` and brings it up per its
/// configured load mode: `off` never auto-loads and 503s until an admin
/// calls `/v1/admin/models/load`; `eager`/`lazy` both call `ensure_loaded`,
/// which is a no-op once the backend is already resident so this is cheap
/// on every request after the first.
async fn ensure_model_ready(state: &AppState, model_id: &str) -> Result<SharedBackend> {
    let (backend, load_mode) = with_registry(state, |registry| {
        let backend = registry.get(model_id)?;
        let load_mode = registry.meta(model_id).map(|m| m.load_mode).unwrap_or(LoadMode::Lazy);
        Ok((backend, load_mode))
    })?;

    if load_mode == LoadMode::Off {
        return Err(GatewayError::LlmNotLoaded);
    }

    backend.ensure_loaded().await?;
    Ok(backend)
}

pub struct GenerateRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub cache: bool,
    pub params: GenerationParams,
}

pub struct GenerateResponse {
    pub model: String,
    pub output: String,
    pub cached: bool,
}

pub struct ExtractRequest {
    pub schema_id: String,
    pub text: String,
    pub model: Option<String>,
    pub cache: bool,
    pub repair: bool,
    pub params: GenerationParams,
}

pub struct ExtractResponse {
    pub schema_id: String,
    pub model: String,
    pub data: Value,
    pub cached: bool,
    pub repair_attempted: bool,
}

/// Runs the full request pipeline for `/v1/generate`: model selection,
/// capability check, cache lookup, quota consumption, generation, cache
/// write, audit log, metrics.
pub async fn generate(
    state: &AppState,
    ctx: &RequestCtx,
    auth: &AuthContext,
    client_host: &str,
    req: GenerateRequest,
) -> Result<GenerateResponse> {
    let started = Instant::now();

    let model_id = with_registry(state, |registry| {
        gateway_model::resolve::select_model(req.model.as_deref(), Some(Cap::Generate), &state.settings, registry)
    })?;
    ctx.set_model(model_id.clone().into());

    with_registry(state, |registry| {
        let policy = state.policy_snapshot();
        gateway_model::resolve::require_capability(&model_id, Cap::Generate, &state.settings.deployment_caps, registry, &policy)
    })?;

    let body = serde_json::json!({
        "prompt": req.prompt,
        "model": req.model,
        "cache": req.cache,
        "max_new_tokens": req.params.max_new_tokens,
        "temperature": req.params.temperature,
        "top_p": req.params.top_p,
        "top_k": req.params.top_k,
        "stop": req.params.stop,
    });
    let hash = prompt_hash(&req.prompt);
    let fp = params_fingerprint(&body);
    let key = redis_key(CacheKind::Generate, &model_id, &hash, &fp);

    if req.cache {
        let hit = state.cache.read(&key, &model_id, &hash, &fp).await;
        if let Some(output) = hit.output {
            ctx.set_cached(true);
            audit(state, ctx, auth, client_host, &model_id, &body, &req.prompt, &output, started).await;
            record_request_metrics(state, ctx, &model_id, true, 200, started, None, Some(&output));
            return Ok(GenerateResponse { model: model_id, output, cached: true });
        }
    }

    state.auth.consume_quota(&auth.api_key_id).await?;

    let backend = ensure_model_ready(state, &model_id).await?;
    let output = backend.generate(&req.prompt, &req.params).await?;

    if req.cache {
        state.cache.write(&key, &model_id, &req.prompt, &hash, &fp, &output).await;
    }

    audit(state, ctx, auth, client_host, &model_id, &body, &req.prompt, &output, started).await;
    record_request_metrics(state, ctx, &model_id, false, 200, started, Some(&req.prompt), Some(&output));
    Ok(GenerateResponse { model: model_id, output, cached: false })
}

/// Runs the full request pipeline for `/v1/extract`: model selection,
/// capability check, cache lookup, quota consumption, generation with
/// schema validation and one-shot repair, cache write, audit log, metrics.
pub async fn extract(
    state: &AppState,
    ctx: &RequestCtx,
    auth: &AuthContext,
    client_host: &str,
    schema: &Schema,
    req: ExtractRequest,
) -> Result<ExtractResponse> {
    let started = Instant::now();

    let model_id = with_registry(state, |registry| {
        gateway_model::resolve::select_model(req.model.as_deref(), Some(Cap::Extract), &state.settings, registry)
    })?;
    ctx.set_model(model_id.clone().into());

    with_registry(state, |registry| {
        let policy = state.policy_snapshot();
        gateway_model::resolve::require_capability(&model_id, Cap::Extract, &state.settings.deployment_caps, registry, &policy)
    })?;

    let body = serde_json::json!({
        "schema_id": req.schema_id,
        "text": req.text,
        "model": req.model,
        "cache": req.cache,
        "repair": req.repair,
        "max_new_tokens": req.params.max_new_tokens,
        "temperature": req.params.temperature,
    });
    let hash = prompt_hash_extract(&req.schema_id, &req.text);
    let fp = params_fingerprint(&body);
    let key = redis_key(CacheKind::Extract, &model_id, &hash, &fp);

    state
        .metrics
        .extraction_requests_total
        .with_label_values(&[&req.schema_id, &model_id])
        .inc();

    if req.cache {
        let hit = state.cache.read(&key, &model_id, &hash, &fp).await;
        if let Some(cached_output) = hit.output {
            if let Ok(data) = serde_json::from_str::<Value>(&cached_output) {
                if schema.is_valid(&data) {
                    ctx.set_cached(true);
                    let layer = hit.layer.map(|l| format!("{l:?}").to_lowercase()).unwrap_or_default();
                    state
                        .metrics
                        .extraction_cache_hits_total
                        .with_label_values(&[&req.schema_id, &model_id, &layer])
                        .inc();
                    audit(state, ctx, auth, client_host, &model_id, &body, &req.text, &cached_output, started).await;
                    record_request_metrics(state, ctx, &model_id, true, 200, started, None, Some(&cached_output));
                    return Ok(ExtractResponse {
                        schema_id: req.schema_id,
                        model: model_id,
                        data,
                        cached: true,
                        repair_attempted: false,
                    });
                }
            }
            // Cached artifact no longer validates (e.g. schema changed); treat as a miss.
        }
    }

    state.auth.consume_quota(&auth.api_key_id).await?;

    let backend = ensure_model_ready(state, &model_id).await?;
    let prompt = gateway_extract::render_extraction_prompt(schema, &req.text);
    let initial_raw = backend.generate(&prompt, &req.params).await?;

    let repair_params = req.params.with_zero_temperature();
    let backend_for_repair = backend.clone();
    let (result, stats) = run_extraction(schema, &req.text, &initial_raw, req.repair, move |repair_prompt| {
        let backend = backend_for_repair.clone();
        let params = repair_params.clone();
        async move { backend.generate(&repair_prompt, &params).await }
    })
    .await;

    if let Some(stage) = stats.failure_stage {
        state
            .metrics
            .extraction_validation_failures_total
            .with_label_values(&[&req.schema_id, &model_id, stage.as_str()])
            .inc();
    }
    if let Some(outcome) = stats.repair_outcome {
        let label = match outcome {
            gateway_extract::RepairOutcome::Success => "success",
            gateway_extract::RepairOutcome::Failure => "failure",
        };
        state
            .metrics
            .extraction_repair_outcomes_total
            .with_label_values(&[&req.schema_id, &model_id, label])
            .inc();
    }

    let data = result?;
    let output = data.to_string();

    if req.cache {
        state.cache.write(&key, &model_id, &req.text, &hash, &fp, &output).await;
    }

    audit(state, ctx, auth, client_host, &model_id, &body, &req.text, &output, started).await;
    record_request_metrics(state, ctx, &model_id, false, 200, started, Some(&req.text), Some(&output));
    Ok(ExtractResponse {
        schema_id: req.schema_id,
        model: model_id,
        data,
        cached: false,
        repair_attempted: stats.repair_attempted,
    })
}

async fn audit(
    state: &AppState,
    ctx: &RequestCtx,
    auth: &AuthContext,
    client_host: &str,
    model_id: &str,
    params: &Value,
    prompt: &str,
    output: &str,
    started: Instant,
) {
    let log = InferenceLog {
        request_id: ctx.request_id.to_string(),
        api_key_id: auth.api_key_id.clone(),
        route: ctx.route.to_string(),
        client_host: client_host.to_string(),
        model_id: model_id.to_string(),
        params: gateway_cache::canonicalize_params(params),
        prompt: prompt.to_string(),
        output: output.to_string(),
        latency_ms: started.elapsed().as_millis() as u64,
        prompt_tokens: if state.settings.token_counting { Some(estimate_tokens(prompt)) } else { None },
        completion_tokens: if state.settings.token_counting { Some(estimate_tokens(output)) } else { None },
    };
    state.audit.append(&log).await;
}

/// Best-effort whitespace-split token estimate; not a real tokenizer.
fn estimate_tokens(s: &str) -> u32 {
    s.split_whitespace().count() as u32
}

/// Records request/latency/token counters for one completed request.
#[allow(clippy::too_many_arguments)]
fn record_request_metrics(
    state: &AppState,
    ctx: &RequestCtx,
    model_id: &str,
    cached: bool,
    status_code: u16,
    started: Instant,
    prompt: Option<&str>,
    output: Option<&str>,
) {
    let route = ctx.route.to_string();
    let cached_label = cached.to_string();
    let status_label = status_code.to_string();
    let labels = [route.as_str(), model_id, cached_label.as_str(), status_label.as_str()];

    state.metrics.requests_total.with_label_values(&labels).inc();
    state
        .metrics
        .request_latency_seconds
        .with_label_values(&labels)
        .observe(started.elapsed().as_secs_f64());

    if state.settings.token_counting {
        if let Some(p) = prompt {
            state
                .metrics
                .tokens_total
                .with_label_values(&["prompt", model_id])
                .inc_by(estimate_tokens(p) as u64);
        }
        if let Some(o) = output {
            state
                .metrics
                .tokens_total
                .with_label_values(&["completion", model_id])
                .inc_by(estimate_tokens(o) as u64);
        }
    }
}
