use serde::Serialize;
use serde_json::Value;

/// Stable error code + HTTP status pair, serialized via the canonical
/// envelope at the HTTP boundary (see `gateway-server::error`).
///
/// Variant names double as the `code` field on the wire — never rename a
/// variant without updating any client relying on the string.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing api key")]
    MissingApiKey,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("forbidden")]
    Forbidden,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("quota exhausted")]
    QuotaExhausted,

    #[error("model `{0}` not allowed")]
    ModelNotAllowed(String),
    #[error("model `{0}` missing from registry")]
    ModelMissing(String),
    #[error("capability `{cap}` not supported by model `{model}`")]
    CapabilityNotSupported { model: String, cap: String },
    #[error("capability `{0}` disabled at deployment level")]
    CapabilityDisabled(String),

    #[error("llm backend unavailable")]
    LlmUnavailable,
    #[error("model not loaded")]
    LlmNotLoaded,

    #[error("upstream timed out")]
    UpstreamTimeout,
    #[error("upstream unreachable")]
    UpstreamUnreachable,
    #[error("upstream error")]
    UpstreamError,
    #[error("upstream returned a bad response")]
    UpstreamBadResponse,
    #[error("upstream request failed")]
    UpstreamRequestFailed,

    #[error("invalid json in model output")]
    InvalidJson { preview: String },
    #[error("schema validation failed")]
    SchemaValidationFailed { errors: Vec<String>, preview: String },
    #[error("json schema missing for `{0}`")]
    JsonSchemaMissing(String),

    #[error("models.yaml missing")]
    ModelsYamlMissing,
    #[error("models.yaml invalid: {0}")]
    ModelsYamlInvalid(String),
    #[error("model config invalid: {0}")]
    ModelConfigInvalid(String),
    #[error("hf cache unwritable")]
    HfCacheUnwritable,

    #[error("not found")]
    NotFound,
    #[error("validation error")]
    ValidationError { fields: Vec<String> },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable wire code, e.g. `"quota_exhausted"`.
    pub fn code(&self) -> &'static str {
        use GatewayError::*;
        match self {
            MissingApiKey => "missing_api_key",
            InvalidApiKey => "invalid_api_key",
            Forbidden => "forbidden",
            RateLimited { .. } => "rate_limited",
            QuotaExhausted => "quota_exhausted",
            ModelNotAllowed(_) => "model_not_allowed",
            ModelMissing(_) => "model_missing",
            CapabilityNotSupported { .. } => "capability_not_supported",
            CapabilityDisabled(_) => "capability_disabled",
            LlmUnavailable => "llm_unavailable",
            LlmNotLoaded => "llm_not_loaded",
            UpstreamTimeout => "upstream_timeout",
            UpstreamUnreachable => "upstream_unreachable",
            UpstreamError => "upstream_error",
            UpstreamBadResponse => "upstream_bad_response",
            UpstreamRequestFailed => "upstream_request_failed",
            InvalidJson { .. } => "invalid_json",
            SchemaValidationFailed { .. } => "schema_validation_failed",
            JsonSchemaMissing(_) => "jsonschema_missing",
            ModelsYamlMissing => "models_yaml_missing",
            ModelsYamlInvalid(_) => "models_yaml_invalid",
            ModelConfigInvalid(_) => "model_config_invalid",
            HfCacheUnwritable => "hf_cache_unwritable",
            NotFound => "not_found",
            ValidationError { .. } => "validation_error",
            Internal(_) => "internal_error",
        }
    }

    /// HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        use GatewayError::*;
        match self {
            MissingApiKey | InvalidApiKey => 401,
            Forbidden => 403,
            RateLimited { .. } => 429,
            QuotaExhausted => 402,
            ModelNotAllowed(_) => 400,
            ModelMissing(_) => 500,
            CapabilityNotSupported { .. } => 400,
            CapabilityDisabled(_) => 501,
            LlmUnavailable | LlmNotLoaded => 503,
            UpstreamTimeout => 504,
            UpstreamUnreachable | UpstreamError | UpstreamBadResponse | UpstreamRequestFailed => 502,
            InvalidJson { .. } | SchemaValidationFailed { .. } => 422,
            JsonSchemaMissing(_) => 500,
            ModelsYamlMissing | ModelsYamlInvalid(_) | ModelConfigInvalid(_) | HfCacheUnwritable => 500,
            NotFound => 404,
            ValidationError { .. } => 422,
            Internal(_) => 500,
        }
    }

    /// Structured `extra` payload for the error envelope, if any.
    pub fn extra(&self) -> Option<Value> {
        use GatewayError::*;
        match self {
            RateLimited { retry_after_secs } => Some(serde_json::json!({ "retry_after": retry_after_secs })),
            SchemaValidationFailed { errors, preview } => {
                Some(serde_json::json!({ "errors": errors, "raw_preview": preview }))
            }
            InvalidJson { preview } => Some(serde_json::json!({ "raw_preview": preview })),
            ValidationError { fields } => Some(serde_json::json!({ "fields": fields })),
            _ => None,
        }
    }
}

/// Wire-format error envelope, per the response-envelope contract.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl GatewayError {
    pub fn into_envelope(self, request_id: Option<String>) -> ErrorEnvelope {
        let extra = self.extra();
        ErrorEnvelope {
            code: self.code().to_string(),
            message: self.to_string(),
            extra,
            request_id,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
