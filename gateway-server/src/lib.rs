pub mod coordinator;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use gateway_auth::{ApiKeyStore, AuthGate};
use gateway_cache::store::{CacheProtocol, KvStore, RowStore};
use gateway_extract::Schema;
use gateway_model::registry::MultiModelManager;
use gateway_policy::PolicySnapshot;
use gateway_settings::Settings;
use gateway_telemetry::{AuditSink, Metrics};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds and wires the full `AppState` (model registry, cache, auth,
/// audit, metrics, schemas) from a `Settings` snapshot. Split out of
/// `main` so integration tests and the binary entrypoint share one path.
pub async fn build_state(settings: Settings) -> anyhow::Result<Arc<AppState>> {
    let mut models_config = Settings::load_models_config().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(mode) = settings.model_load_mode_override {
        for spec in &mut models_config.models {
            spec.load_mode = mode;
        }
    }

    let any_loadable = models_config.models.iter().any(|s| s.load_mode != gateway_core::LoadMode::Off);
    let registry = if any_loadable {
        let registry = MultiModelManager::build(&models_config, settings.remote_backend_timeout)?;
        for spec in &models_config.models {
            if spec.load_mode == gateway_core::LoadMode::Eager {
                registry.get(&spec.id)?.ensure_loaded().await?;
                tracing::info!(model_id = %spec.id, "eager model loaded");
            }
        }
        Some(registry)
    } else {
        tracing::info!("every configured model is off, registry left unbuilt at startup");
        None
    };

    if settings.model_warmup {
        if let Some(registry) = &registry {
            let default_id = registry.default_id().to_string();
            if let Ok(backend) = registry.get(&default_id) {
                let params = gateway_model::backend::GenerationParams {
                    max_new_tokens: Some(settings.model_warmup_max_new_tokens),
                    ..Default::default()
                };
                if let Err(e) = backend.generate(&settings.model_warmup_prompt, &params).await {
                    tracing::warn!(error = %e, "model warmup request failed");
                }
            }
        }
    }

    let policy = PolicySnapshot::load_from_env();

    let row_store = RowStore::connect(&settings.database_url).await?;
    row_store.migrate().await?;
    let kv_store = if settings.redis_enabled {
        match &settings.redis_url {
            Some(url) => match KvStore::connect(url).await {
                Ok(kv) => Some(kv),
                Err(e) => {
                    tracing::warn!(error = %e, "redis connect failed, running KV-less");
                    None
                }
            },
            None => None,
        }
    } else {
        None
    };
    let kv_enabled = kv_store.is_some();
    let cache = CacheProtocol::new(row_store, kv_store, settings.cache_ttl_seconds);

    let key_store = ApiKeyStore::connect(&settings.database_url).await?;
    key_store.migrate().await?;
    let auth = AuthGate::new(key_store, settings.rate_limit_per_minute.clone());
    auth.migrate().await?;

    let audit = AuditSink::connect(&settings.database_url).await?;
    audit.migrate().await?;

    let metrics = Metrics::new();
    metrics.set_kv_enabled(kv_enabled);

    let schemas = load_schemas(&settings.schemas_dir)?;

    Ok(Arc::new(AppState {
        settings,
        registry: RwLock::new(registry),
        registry_load_lock: AsyncMutex::new(()),
        policy: RwLock::new(Arc::new(policy)),
        cache,
        auth,
        audit,
        metrics,
        schemas,
    }))
}

/// Assembles the full route table plus the ambient `tower-http` layers
/// (trace, CORS, timeout, body-size limit). No `TcpListener` binding here
/// so the router alone is reusable under `tower::ServiceExt::oneshot` in
/// tests.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.settings.cors_allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> =
            state.settings.cors_allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };
    let max_body_bytes = state.settings.max_body_bytes;

    Router::new()
        .route("/healthz", get(routes::health::healthz))
        .route("/readyz", get(routes::health::readyz))
        .route("/modelz", get(routes::health::modelz))
        .route("/metrics", get(routes::health::metrics))
        .route("/v1/models", get(routes::models::list_models))
        .route("/v1/generate", post(routes::generate::generate))
        .route("/v1/generate/batch", post(routes::generate::generate_batch))
        .route("/v1/extract", post(routes::extract::extract))
        .route("/v1/schemas", get(routes::schemas::list_schemas))
        .route("/v1/schemas/{id}", get(routes::schemas::get_schema))
        .route("/v1/me/usage", get(routes::usage::my_usage))
        .route("/v1/admin/keys", get(routes::admin::list_keys).post(routes::admin::create_key))
        .route("/v1/admin/keys/disable", post(routes::admin::disable_key))
        .route("/v1/admin/logs", get(routes::admin::list_logs))
        .route("/v1/admin/usage", get(routes::admin::usage_for_key))
        .route("/v1/admin/stats", get(routes::admin::stats))
        .route("/v1/admin/models/load", post(routes::models::load_model))
        .route("/v1/admin/policy", get(routes::admin::get_policy))
        .route("/v1/admin/policy/reload", post(routes::admin::reload_policy))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

/// Loads every `*.schema.json` file under `dir` into a `schema_id -> Schema`
/// map, keyed by file stem. Schema registry *loading* is ambient plumbing;
/// the validator itself lives in `gateway-extract`.
fn load_schemas(dir: &str) -> anyhow::Result<HashMap<String, Arc<Schema>>> {
    let mut schemas = HashMap::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => {
            tracing::warn!(dir, "schemas directory not found, starting with no registered schemas");
            return Ok(schemas);
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.trim_end_matches(".schema").to_string(),
            None => continue,
        };
        let contents = std::fs::read_to_string(&path)?;
        let document: serde_json::Value = serde_json::from_str(&contents)?;
        let schema = Schema::compile(stem.clone(), document).map_err(|e| anyhow::anyhow!("schema `{stem}` invalid: {e}"))?;
        schemas.insert(stem, Arc::new(schema));
    }

    Ok(schemas)
}
