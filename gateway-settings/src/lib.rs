pub mod model_config;

pub use model_config::{ModelSpec, ModelsConfig, ModelsConfigSource, ModelsDefaults};

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Feature flags gating an endpoint at the deployment level, independent
/// of any individual model's own capability support.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentCaps {
    #[serde(default = "default_true")]
    pub generate: bool,
    #[serde(default = "default_true")]
    pub extract: bool,
}

impl Default for DeploymentCaps {
    fn default() -> Self {
        Self { generate: true, extract: true }
    }
}

fn default_true() -> bool {
    true
}

/// Immutable per-process view of configuration, built once at startup from
/// environment variables and (optionally) a YAML file. Never mutated after
/// construction; the registry's `off -> loaded` transition lives on
/// `AppState`, not here.
#[derive(Debug, Clone)]
pub struct Settings {
    pub env: String,
    pub bind_addr: String,
    pub cors_allowed_origins: Vec<String>,
    pub model_allow_list: Vec<String>,
    pub deployment_caps: DeploymentCaps,
    pub policy_decision_path: Option<String>,
    pub require_model_ready: bool,
    pub redis_url: Option<String>,
    pub redis_enabled: bool,
    pub token_counting: bool,
    pub model_warmup: bool,
    pub model_warmup_prompt: String,
    pub model_warmup_max_new_tokens: u32,
    pub remote_backend_timeout: Duration,
    pub cache_ttl_seconds: u64,
    pub rate_limit_per_minute: RateLimits,
    pub database_url: String,
    pub max_body_bytes: usize,
    pub schemas_dir: String,
    pub model_load_mode_override: Option<gateway_core::LoadMode>,
}

#[derive(Debug, Clone)]
pub struct RateLimits {
    pub admin: Option<u32>,
    pub standard: u32,
    pub free: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self { admin: None, standard: 60, free: 10 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("models.yaml missing at `{0}`")]
    ModelsYamlMissing(String),
    #[error("models.yaml invalid: {0}")]
    ModelsYamlInvalid(String),
}

impl Settings {
    /// Build the snapshot from environment variables. Call once at process
    /// startup.
    pub fn from_env() -> Self {
        Self {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            cors_allowed_origins: split_csv(std::env::var("CORS_ALLOWED_ORIGINS").ok()),
            model_allow_list: split_csv(std::env::var("MODEL_ALLOW_LIST").ok()),
            deployment_caps: DeploymentCaps {
                generate: env_bool("FEATURE_GENERATE", true),
                extract: env_bool("FEATURE_EXTRACT", true),
            },
            policy_decision_path: std::env::var("POLICY_DECISION_PATH").ok(),
            require_model_ready: env_bool("REQUIRE_MODEL_READY", true),
            redis_url: std::env::var("REDIS_URL").ok(),
            redis_enabled: env_bool("REDIS_ENABLED", true),
            token_counting: env_bool("TOKEN_COUNTING", true),
            model_warmup: env_bool("MODEL_WARMUP", false),
            model_warmup_prompt: std::env::var("MODEL_WARMUP_PROMPT")
                .unwrap_or_else(|_| "hello".to_string()),
            model_warmup_max_new_tokens: std::env::var("MODEL_WARMUP_MAX_NEW_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            remote_backend_timeout: Duration::from_secs(
                std::env::var("REMOTE_BACKEND_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            cache_ttl_seconds: std::env::var("CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            rate_limit_per_minute: RateLimits::default(),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite::memory:".to_string()),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2 * 1024 * 1024),
            schemas_dir: std::env::var("SCHEMAS_DIR").unwrap_or_else(|_| "schemas".to_string()),
            model_load_mode_override: std::env::var("MODEL_LOAD_MODE")
                .ok()
                .and_then(|v| gateway_core::LoadMode::parse(&v)),
        }
    }

    /// Whether `model_id` is permitted by the allow-list. An empty
    /// allow-list means "no restriction".
    pub fn allows_model(&self, model_id: &str) -> bool {
        self.model_allow_list.is_empty()
            || self.model_allow_list.iter().any(|m| m == model_id)
    }

    /// Resolves the models.yaml path following
    /// `APP_CONFIG_PATH` -> `MODELS_YAML` -> `$APP_ROOT/models.yaml`.
    pub fn models_yaml_path() -> Option<String> {
        std::env::var("APP_CONFIG_PATH")
            .ok()
            .or_else(|| std::env::var("MODELS_YAML").ok())
            .or_else(|| {
                std::env::var("APP_ROOT")
                    .ok()
                    .map(|root| format!("{root}/models.yaml"))
            })
    }

    pub fn load_models_config() -> Result<ModelsConfig, SettingsError> {
        let path = Self::models_yaml_path()
            .ok_or_else(|| SettingsError::ModelsYamlMissing("<unset>".to_string()))?;
        let raw = std::fs::read_to_string(&path)
            .map_err(|_| SettingsError::ModelsYamlMissing(path.clone()))?;
        let source: ModelsConfigSource = serde_yaml::from_str(&raw)
            .map_err(|e| SettingsError::ModelsYamlInvalid(e.to_string()))?;
        ModelsConfig::validate(source).map_err(SettingsError::ModelsYamlInvalid)
    }
}

fn split_csv(raw: Option<String>) -> Vec<String> {
    raw.map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Used by `allows_model` tests to avoid depending on process env state.
pub fn dedupe_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_allows_everything() {
        let mut s = Settings::from_env();
        s.model_allow_list = vec![];
        assert!(s.allows_model("anything"));
    }

    #[test]
    fn nonempty_allow_list_restricts() {
        let mut s = Settings::from_env();
        s.model_allow_list = vec!["a".to_string()];
        assert!(s.allows_model("a"));
        assert!(!s.allows_model("b"));
    }
}
