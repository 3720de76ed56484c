pub mod capability;
pub mod ctx;
pub mod error;
pub mod types;

pub use capability::{Cap, Caps, RawCapsMeta};
pub use ctx::RequestCtx;
pub use error::{ErrorEnvelope, GatewayError, Result};
pub use types::{ApiKeyValue, BackendKind, LoadMode, ModelId, RequestId, Route, SchemaId};
