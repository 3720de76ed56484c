pub mod backend;
pub mod registry;
pub mod resolve;

pub use backend::{GenerationParams, LocalBackend, ModelBackend, RemoteBackend, SharedBackend};
pub use registry::{ModelMeta, ModelStatus, MultiModelManager};
pub use resolve::{effective_caps, require_capability, select_model};
