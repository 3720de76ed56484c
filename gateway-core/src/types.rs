use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize, Default,
)]
pub struct ModelId(String);

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize,
)]
pub struct RequestId(String);

impl Default for RequestId {
    fn default() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize)]
pub struct ApiKeyValue(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize)]
pub struct SchemaId(String);

/// The route a request is handled under; carried on `RequestCtx` and used
/// as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    #[display("generate")]
    Generate,
    #[display("generate_batch")]
    GenerateBatch,
    #[display("extract")]
    Extract,
}

/// Backend kind for a registered model (`ModelSpec.backend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Remote,
}

/// Startup/runtime policy governing when model weights become resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    Eager,
    Lazy,
    Off,
}

impl LoadMode {
    /// Parses the `MODEL_LOAD_MODE` override value. `"on"` is a historical
    /// alias for `"eager"`; anything else unrecognized is `None` so the
    /// caller can fall back to per-model configuration instead of a panic.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "eager" | "on" => Some(LoadMode::Eager),
            "lazy" => Some(LoadMode::Lazy),
            "off" => Some(LoadMode::Off),
            _ => None,
        }
    }
}
