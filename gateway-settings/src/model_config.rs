use gateway_core::capability::RawCapsMeta;
use gateway_core::{BackendKind, LoadMode};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub backend: BackendKind,
    #[serde(default = "default_load_mode")]
    pub load_mode: LoadMode,
    #[serde(default)]
    pub capabilities: Option<RawCapsMeta>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub dtype: Option<String>,
    #[serde(default)]
    pub quantization: Option<String>,
    #[serde(default)]
    pub trust_remote_code: bool,
    #[serde(default)]
    pub notes: Option<String>,
    /// Required for `backend = remote`.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_load_mode() -> LoadMode {
    LoadMode::Lazy
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsDefaults {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub dtype: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfigSource {
    pub primary_id: String,
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub defaults: ModelsDefaults,
}

/// Validated, ordering-normalized view of `models.yaml`: `primary_id` is
/// guaranteed to be first in `models` and to appear exactly once.
#[derive(Debug, Clone)]
pub struct ModelsConfig {
    pub primary_id: String,
    pub models: Vec<ModelSpec>,
    pub defaults: ModelsDefaults,
}

impl ModelsConfig {
    pub fn validate(source: ModelsConfigSource) -> Result<Self, String> {
        if source.primary_id.trim().is_empty() {
            return Err("primary_id must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for m in &source.models {
            if m.id.trim().is_empty() {
                return Err("model id must not be empty".to_string());
            }
            if m.backend == BackendKind::Remote && m.base_url.is_none() {
                return Err(format!("model `{}` is remote but has no base_url", m.id));
            }
            if !seen.insert(m.id.clone()) {
                return Err(format!("duplicate model id `{}`", m.id));
            }
        }

        let mut models = source.models;
        match models.iter().position(|m| m.id == source.primary_id) {
            Some(idx) => {
                let primary = models.remove(idx);
                models.insert(0, primary);
            }
            None => {
                return Err(format!(
                    "primary_id `{}` not present in model list",
                    source.primary_id
                ));
            }
        }

        Ok(Self { primary_id: source.primary_id, models, defaults: source.defaults })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str) -> ModelSpec {
        ModelSpec {
            id: id.to_string(),
            backend: BackendKind::Local,
            load_mode: LoadMode::Lazy,
            capabilities: None,
            device: None,
            dtype: None,
            quantization: None,
            trust_remote_code: false,
            notes: None,
            base_url: None,
        }
    }

    #[test]
    fn primary_moved_to_front() {
        let source = ModelsConfigSource {
            primary_id: "b".to_string(),
            models: vec![spec("a"), spec("b"), spec("c")],
            defaults: ModelsDefaults::default(),
        };
        let cfg = ModelsConfig::validate(source).unwrap();
        assert_eq!(cfg.models[0].id, "b");
        assert_eq!(cfg.models.len(), 3);
    }

    #[test]
    fn missing_primary_rejected() {
        let source = ModelsConfigSource {
            primary_id: "missing".to_string(),
            models: vec![spec("a")],
            defaults: ModelsDefaults::default(),
        };
        assert!(ModelsConfig::validate(source).is_err());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let source = ModelsConfigSource {
            primary_id: "a".to_string(),
            models: vec![spec("a"), spec("a")],
            defaults: ModelsDefaults::default(),
        };
        assert!(ModelsConfig::validate(source).is_err());
    }

    #[test]
    fn remote_without_base_url_rejected() {
        let mut m = spec("a");
        m.backend = BackendKind::Remote;
        let source = ModelsConfigSource {
            primary_id: "a".to_string(),
            models: vec![m],
            defaults: ModelsDefaults::default(),
        };
        assert!(ModelsConfig::validate(source).is_err());
    }
}
