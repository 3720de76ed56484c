use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Structured-logging configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub service_name: String,
    pub default_level: String,
    pub json: bool,
}

impl LoggingConfig {
    /// `SERVICE_NAME` defaults to `"llm-gateway"`, `LOG_LEVEL` to `"info"`,
    /// `LOG_FORMAT=json` switches to structured JSON lines.
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "llm-gateway".to_string()),
            default_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            json: std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false),
        }
    }
}

/// Installs the global `tracing` subscriber. Idempotent — safe to call
/// more than once (e.g. from both `main` and integration test setup).
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level));

        if config.json {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(true).json().init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true).init();
        }

        tracing::info!(service.name = %config.service_name, log.level = %config.default_level, "logging initialized");
    });
}
