use crate::backend::{LocalBackend, RemoteBackend, SharedBackend};
use gateway_core::capability::Caps;
use gateway_core::{BackendKind, GatewayError, LoadMode, Result};
use gateway_settings::ModelsConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ModelMeta {
    pub backend_name: &'static str,
    pub load_mode: LoadMode,
    pub caps: Caps,
}

/// `model-id -> backend` map plus default-id and per-model metadata.
/// Immutable after `build()` except for the `off -> loaded` transition,
/// which callers serialize behind their own mutex (see
/// `gateway-server::state`).
pub struct MultiModelManager {
    backends: HashMap<String, SharedBackend>,
    meta: HashMap<String, ModelMeta>,
    default_id: String,
    order: Vec<String>,
}

impl MultiModelManager {
    pub fn build(config: &ModelsConfig, remote_timeout: Duration) -> Result<Self> {
        let mut backends = HashMap::new();
        let mut meta = HashMap::new();
        let mut order = Vec::new();

        for spec in &config.models {
            let backend: SharedBackend = match spec.backend {
                BackendKind::Local => Arc::new(LocalBackend::new(spec.id.clone())),
                BackendKind::Remote => {
                    let base_url = spec.base_url.clone().ok_or_else(|| {
                        GatewayError::ModelConfigInvalid(format!("model `{}` missing base_url", spec.id))
                    })?;
                    Arc::new(RemoteBackend::new(spec.id.clone(), base_url, remote_timeout))
                }
            };
            let caps = Caps::from_raw(spec.capabilities.clone());
            order.push(spec.id.clone());
            meta.insert(
                spec.id.clone(),
                ModelMeta { backend_name: backend.backend_name(), load_mode: spec.load_mode, caps },
            );
            backends.insert(spec.id.clone(), backend);
        }

        Ok(Self { backends, meta, default_id: config.primary_id.clone(), order })
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn get(&self, model_id: &str) -> Result<SharedBackend> {
        self.backends
            .get(model_id)
            .cloned()
            .ok_or_else(|| GatewayError::ModelMissing(model_id.to_string()))
    }

    pub fn meta(&self, model_id: &str) -> Option<&ModelMeta> {
        self.meta.get(model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.backends.contains_key(model_id)
    }

    /// Best model for `cap`: the default if it supports it, else the
    /// first model (in config order) that does, else the default anyway.
    pub fn default_for(&self, cap: gateway_core::Cap) -> String {
        if self.meta.get(&self.default_id).map(|m| m.caps.has(cap)).unwrap_or(true) {
            return self.default_id.clone();
        }
        for id in &self.order {
            if self.meta.get(id).map(|m| m.caps.has(cap)).unwrap_or(true) {
                return id.clone();
            }
        }
        self.default_id.clone()
    }

    /// Loads only the default backend.
    pub async fn ensure_loaded(&self) -> Result<()> {
        self.get(&self.default_id)?.ensure_loaded().await
    }

    /// Loads every backend that has a loader (all of them, here — every
    /// backend implements `ensure_loaded`, local ones actually load
    /// weights while remote ones are a no-op).
    pub async fn load_all(&self) -> Result<()> {
        for backend in self.backends.values() {
            backend.ensure_loaded().await?;
        }
        Ok(())
    }

    pub fn is_loaded(&self, model_id: &str) -> Result<bool> {
        Ok(self.get(model_id)?.is_loaded())
    }

    /// Force-loads a single backend, regardless of its configured load
    /// mode. Used by the admin `models/load` endpoint, including to bring
    /// an `off`-mode model up without restarting the process.
    pub async fn load_one(&self, model_id: &str) -> Result<()> {
        self.get(model_id)?.ensure_loaded().await
    }

    /// Ordered status rows for `/v1/models` and readiness surfaces.
    pub fn status(&self) -> Vec<ModelStatus> {
        self.order
            .iter()
            .map(|id| {
                let backend = self.backends.get(id).expect("order is derived from backends map");
                let meta = self.meta.get(id).expect("meta inserted alongside backend");
                ModelStatus {
                    model_id: id.clone(),
                    backend_name: meta.backend_name,
                    load_mode: meta.load_mode,
                    loaded: backend.is_loaded(),
                    is_default: id == &self.default_id,
                    caps: meta.caps.clone(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStatus {
    pub model_id: String,
    pub backend_name: &'static str,
    pub load_mode: LoadMode,
    pub loaded: bool,
    pub is_default: bool,
    #[serde(skip)]
    pub caps: Caps,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_settings::model_config::{ModelsConfigSource, ModelsDefaults};
    use gateway_settings::ModelSpec;

    fn local_spec(id: &str, load_mode: LoadMode) -> ModelSpec {
        ModelSpec {
            id: id.to_string(),
            backend: BackendKind::Local,
            load_mode,
            capabilities: None,
            device: None,
            dtype: None,
            quantization: None,
            trust_remote_code: false,
            notes: None,
            base_url: None,
        }
    }

    fn build(models: Vec<ModelSpec>, primary: &str) -> MultiModelManager {
        let source = ModelsConfigSource {
            primary_id: primary.to_string(),
            models,
            defaults: ModelsDefaults::default(),
        };
        let cfg = ModelsConfig::validate(source).unwrap();
        MultiModelManager::build(&cfg, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn missing_model_is_an_error() {
        let mgr = build(vec![local_spec("a", LoadMode::Lazy)], "a");
        let err = mgr.get("nope").unwrap_err();
        assert_eq!(err.code(), "model_missing");
    }

    #[tokio::test]
    async fn ensure_loaded_only_loads_default() {
        let mgr = build(vec![local_spec("a", LoadMode::Lazy), local_spec("b", LoadMode::Lazy)], "a");
        mgr.ensure_loaded().await.unwrap();
        assert!(mgr.is_loaded("a").unwrap());
        assert!(!mgr.is_loaded("b").unwrap());
    }

    #[tokio::test]
    async fn load_all_loads_every_backend() {
        let mgr = build(vec![local_spec("a", LoadMode::Lazy), local_spec("b", LoadMode::Lazy)], "a");
        mgr.load_all().await.unwrap();
        assert!(mgr.is_loaded("a").unwrap());
        assert!(mgr.is_loaded("b").unwrap());
    }

    #[test]
    fn status_preserves_config_order_with_primary_first() {
        let mgr = build(vec![local_spec("b", LoadMode::Lazy), local_spec("a", LoadMode::Lazy)], "a");
        let status = mgr.status();
        assert_eq!(status[0].model_id, "a");
        assert!(status[0].is_default);
    }
}
