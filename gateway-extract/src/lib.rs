pub mod repair;
pub mod schema;
pub mod validate;

pub use repair::{run_extraction, ExtractStats, RepairOutcome};
pub use schema::{render_extraction_prompt, render_repair_prompt, Schema};
pub use validate::{scan_json_objects, strict_decode_object, validate_first_matching, Stage, ValidationFailure};
