pub mod entities;
pub mod gate;
pub mod rate_limit;
pub mod store;

pub use entities::{ApiKeyRecord, AuthContext, Role};
pub use gate::AuthGate;
pub use rate_limit::RateLimiter;
pub use store::ApiKeyStore;
