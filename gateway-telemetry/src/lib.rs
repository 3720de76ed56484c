pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{AuditSink, InferenceLog, UsageSummary};
pub use logging::LoggingConfig;
pub use metrics::Metrics;
