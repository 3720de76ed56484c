use axum::body::Body;
use axum::http::{Request, StatusCode};
use gateway_auth::{ApiKeyStore, AuthGate};
use gateway_cache::store::{CacheProtocol, RowStore};
use gateway_core::capability::RawCapsMeta;
use gateway_core::{BackendKind, LoadMode};
use gateway_extract::Schema;
use gateway_model::registry::MultiModelManager;
use gateway_policy::PolicySnapshot;
use gateway_server::state::AppState;
use gateway_settings::model_config::{ModelsConfigSource, ModelsDefaults};
use gateway_settings::{DeploymentCaps, ModelSpec, ModelsConfig, RateLimits, Settings};
use gateway_telemetry::{AuditSink, Metrics};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tower::ServiceExt;

fn local_spec(id: &str, caps: Option<RawCapsMeta>) -> ModelSpec {
    ModelSpec {
        id: id.to_string(),
        backend: BackendKind::Local,
        load_mode: LoadMode::Eager,
        capabilities: caps,
        device: None,
        dtype: None,
        quantization: None,
        trust_remote_code: false,
        notes: None,
        base_url: None,
    }
}

fn settings() -> Settings {
    Settings {
        env: "test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        cors_allowed_origins: vec![],
        model_allow_list: vec![],
        deployment_caps: DeploymentCaps::default(),
        policy_decision_path: None,
        require_model_ready: true,
        redis_url: None,
        redis_enabled: false,
        token_counting: true,
        model_warmup: false,
        model_warmup_prompt: "hello".to_string(),
        model_warmup_max_new_tokens: 8,
        remote_backend_timeout: Duration::from_secs(5),
        cache_ttl_seconds: 3600,
        rate_limit_per_minute: RateLimits { admin: None, standard: 60, free: 10 },
        database_url: "sqlite::memory:".to_string(),
        max_body_bytes: 2 * 1024 * 1024,
        schemas_dir: "schemas".to_string(),
    }
}

/// Builds a fully wired `AppState` with two local models (`m1` default, and
/// `no-extract` whose capability map denies `extract`) plus a `person`
/// extraction schema, all backed by in-memory sqlite. Returns the router
/// alongside the provisioned `admin`/`standard` key values.
async fn test_app() -> (axum::Router, &'static str, &'static str) {
    let source = ModelsConfigSource {
        primary_id: "m1".to_string(),
        models: vec![
            local_spec("m1", None),
            local_spec("no-extract", Some(RawCapsMeta::AllowList(vec!["generate".to_string()]))),
        ],
        defaults: ModelsDefaults::default(),
    };
    let config = ModelsConfig::validate(source).unwrap();
    let registry = MultiModelManager::build(&config, Duration::from_secs(5)).unwrap();
    registry.load_all().await.unwrap();

    let row_store = RowStore::connect("sqlite::memory:").await.unwrap();
    row_store.migrate().await.unwrap();
    let cache = CacheProtocol::new(row_store, None, 3600);

    let key_store = ApiKeyStore::connect("sqlite::memory:").await.unwrap();
    key_store.migrate().await.unwrap();
    key_store.create("admin-key", Some("admin"), None, Some("ci-admin")).await.unwrap();
    key_store.create("standard-key", Some("standard"), Some(1000), Some("ci-standard")).await.unwrap();
    let auth = AuthGate::new(key_store, RateLimits { admin: None, standard: 60, free: 10 });

    let audit = AuditSink::connect("sqlite::memory:").await.unwrap();
    audit.migrate().await.unwrap();

    let metrics = Metrics::new();

    let person_schema = Schema::compile(
        "person",
        json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } },
            "additionalProperties": false,
        }),
    )
    .unwrap();
    let mut schemas = HashMap::new();
    schemas.insert("person".to_string(), Arc::new(person_schema));

    let state = Arc::new(AppState {
        settings: settings(),
        registry: RwLock::new(Some(registry)),
        registry_load_lock: AsyncMutex::new(()),
        policy: RwLock::new(Arc::new(PolicySnapshot::NotConfigured)),
        cache,
        auth,
        audit,
        metrics,
        schemas,
    });

    (gateway_server::build_router(state), "admin-key", "standard-key")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_api_key_is_rejected() {
    let (app, _admin, _std) = test_app().await;
    let req = Request::builder()
        .method("POST")
        .uri("/v1/generate")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "prompt": "hi" }).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "missing_api_key");
}

#[tokio::test]
async fn invalid_api_key_is_rejected() {
    let (app, _admin, _std) = test_app().await;
    let req = Request::builder()
        .method("POST")
        .uri("/v1/generate")
        .header("content-type", "application/json")
        .header("authorization", "Bearer nonsense")
        .body(Body::from(json!({ "prompt": "hi" }).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn generate_succeeds_for_standard_key_and_echoes_the_prompt() {
    let (app, _admin, std_key) = test_app().await;
    let req = Request::builder()
        .method("POST")
        .uri("/v1/generate")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {std_key}"))
        .body(Body::from(json!({ "prompt": "hello world", "cache": false }).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["model"], "m1");
    assert_eq!(body["output"], "hello world");
    assert_eq!(body["cached"], false);
}

#[tokio::test]
async fn second_cached_generate_call_is_served_from_cache() {
    let (app, _admin, std_key) = test_app().await;
    let make_req = || {
        Request::builder()
            .method("POST")
            .uri("/v1/generate")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {std_key}"))
            .body(Body::from(json!({ "prompt": "cache me", "cache": true }).to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(make_req()).await.unwrap();
    assert_eq!(body_json(first).await["cached"], false);

    let second = app.oneshot(make_req()).await.unwrap();
    assert_eq!(body_json(second).await["cached"], true);
}

#[tokio::test]
async fn extract_denied_when_model_capability_excludes_it() {
    let (app, _admin, std_key) = test_app().await;
    let req = Request::builder()
        .method("POST")
        .uri("/v1/extract")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {std_key}"))
        .body(
            Body::from(
                json!({ "schema_id": "person", "text": "Jane Doe", "model": "no-extract" }).to_string(),
            ),
        )
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "capability_not_supported");
}

#[tokio::test]
async fn extract_with_unknown_schema_is_not_found() {
    let (app, _admin, std_key) = test_app().await;
    let req = Request::builder()
        .method("POST")
        .uri("/v1/extract")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {std_key}"))
        .body(Body::from(json!({ "schema_id": "nope", "text": "Jane Doe" }).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "jsonschema_missing");
}

#[tokio::test]
async fn admin_route_forbidden_for_standard_key() {
    let (app, _admin, std_key) = test_app().await;
    let req = Request::builder()
        .method("GET")
        .uri("/v1/admin/stats")
        .header("authorization", format!("Bearer {std_key}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_route_allowed_for_admin_key() {
    let (app, admin_key, _std) = test_app().await;
    let req = Request::builder()
        .method("GET")
        .uri("/v1/admin/stats")
        .header("authorization", format!("Bearer {admin_key}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn healthz_requires_no_auth() {
    let (app, _admin, _std) = test_app().await;
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
