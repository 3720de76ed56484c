use crate::error::AppError;
use crate::routes::{require_admin, Authenticated};
use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use gateway_core::GatewayError;
use gateway_model::registry::MultiModelManager;
use gateway_settings::Settings;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct ModelsResponse {
    default_id: Option<String>,
    models: Vec<serde_json::Value>,
    deployment: serde_json::Value,
}

/// `GET /v1/models`: lists models with effective capabilities, load-mode,
/// loaded flag, backend label, default flag.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let guard = state.registry.read().expect("registry lock poisoned");
    let Some(registry) = guard.as_ref() else {
        return Ok(Json(ModelsResponse {
            default_id: None,
            models: Vec::new(),
            deployment: json!({
                "generate": state.settings.deployment_caps.generate,
                "extract": state.settings.deployment_caps.extract,
            }),
        }));
    };

    let policy = state.policy_snapshot();
    let models: Vec<serde_json::Value> = registry
        .status()
        .into_iter()
        .map(|status| {
            let effective = gateway_model::resolve::effective_caps(
                &status.model_id,
                &state.settings.deployment_caps,
                registry,
                &policy,
            );
            json!({
                "model_id": status.model_id,
                "backend": status.backend_name,
                "load_mode": status.load_mode,
                "loaded": status.loaded,
                "is_default": status.is_default,
                "generate": effective.has(gateway_core::Cap::Generate),
                "extract": effective.has(gateway_core::Cap::Extract),
            })
        })
        .collect();

    Ok(Json(ModelsResponse {
        default_id: Some(registry.default_id().to_string()),
        models,
        deployment: json!({
            "generate": state.settings.deployment_caps.generate,
            "extract": state.settings.deployment_caps.extract,
        }),
    }))
}

/// `POST /v1/admin/models/load` (admin-gated): force-loads or refreshes a
/// model into the process, including bringing an `off`-mode model up
/// without a restart. Serialized on `registry_load_lock` so only one
/// build+load runs concurrently, and so a fresh registry is never built
/// twice by two racing admins.
pub async fn load_model(
    State(state): State<Arc<AppState>>,
    Authenticated(auth): Authenticated,
    Json(body): Json<LoadModelBody>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &auth)?;
    let _guard = state.registry_load_lock.lock().await;

    let registry_exists = state.registry.read().expect("registry lock poisoned").is_some();
    if !registry_exists {
        let mut models_config = Settings::load_models_config()
            .map_err(|e| AppError::new(GatewayError::ModelConfigInvalid(e.to_string())))?;
        if let Some(mode) = state.settings.model_load_mode_override {
            for spec in &mut models_config.models {
                spec.load_mode = mode;
            }
        }
        let built = MultiModelManager::build(&models_config, state.settings.remote_backend_timeout)?;
        *state.registry.write().expect("registry lock poisoned") = Some(built);
    }

    {
        let guard = state.registry.read().expect("registry lock poisoned");
        let registry = guard.as_ref().expect("built above if it was missing");
        registry.load_one(&body.model_id).await?;
    }

    Ok(Json(json!({ "model_id": body.model_id, "loaded": true })))
}

#[derive(Debug, serde::Deserialize)]
pub struct LoadModelBody {
    pub model_id: String,
}
