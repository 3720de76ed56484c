use gateway_auth::AuthGate;
use gateway_cache::CacheProtocol;
use gateway_extract::Schema;
use gateway_model::registry::MultiModelManager;
use gateway_policy::PolicySnapshot;
use gateway_settings::Settings;
use gateway_telemetry::{AuditSink, Metrics};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex as AsyncMutex;

/// Process-wide shared state, constructed once in `main`. `Settings` and
/// the schema registry are immutable after startup; the model registry
/// and policy snapshot each carry their own narrow interior mutability
/// for the one mutation each supports.
pub struct AppState {
    pub settings: Settings,
    pub registry: RwLock<Option<MultiModelManager>>,
    pub registry_load_lock: AsyncMutex<()>,
    pub policy: RwLock<Arc<PolicySnapshot>>,
    pub cache: CacheProtocol,
    pub auth: AuthGate,
    pub audit: AuditSink,
    pub metrics: Metrics,
    pub schemas: HashMap<String, Arc<Schema>>,
}

impl AppState {
    pub fn policy_snapshot(&self) -> Arc<PolicySnapshot> {
        self.policy.read().expect("policy lock poisoned").clone()
    }

    pub fn replace_policy(&self, snapshot: PolicySnapshot) {
        *self.policy.write().expect("policy lock poisoned") = Arc::new(snapshot);
    }

    pub fn schema(&self, schema_id: &str) -> Option<Arc<Schema>> {
        self.schemas.get(schema_id).cloned()
    }
}

/// Runs `f` with a read lock on the registry, returning `llm_not_loaded`
/// if the registry has not been built yet (every configured model `off`
/// and none has been admin-loaded).
pub fn with_registry<T>(
    state: &AppState,
    f: impl FnOnce(&MultiModelManager) -> gateway_core::Result<T>,
) -> gateway_core::Result<T> {
    let guard = state.registry.read().expect("registry lock poisoned");
    match guard.as_ref() {
        Some(registry) => f(registry),
        None => Err(gateway_core::GatewayError::LlmNotLoaded),
    }
}
