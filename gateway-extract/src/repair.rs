use crate::schema::{render_repair_prompt, Schema};
use crate::validate::{validate_first_matching, Stage, ValidationFailure};
use gateway_core::GatewayError;
use serde_json::{json, Value};
use std::future::Future;

/// Outcome of a one-shot repair attempt, for metrics labeling. Not
/// surfaced on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Success,
    Failure,
}

#[derive(Debug, Default)]
pub struct ExtractStats {
    pub repair_attempted: bool,
    pub repair_outcome: Option<RepairOutcome>,
    pub failure_stage: Option<Stage>,
}

/// `{code, message, extra}` derived from the failed error, matching the
/// repair prompt's error-hint shape.
fn error_hint(failure: &ValidationFailure) -> Value {
    json!({
        "code": failure.error.code(),
        "message": failure.error.to_string(),
        "extra": failure.error.extra(),
    })
}

/// Runs the validate-first-matching pass over `initial_raw`, and — if it
/// fails and `repair_enabled` — makes exactly one repair call through
/// `call_backend` with a temperature-zero, error-annotated prompt, then
/// validates that single repair output. Never recurses: a failed repair
/// output is returned as the final error, it is never repaired again.
///
/// `call_backend` is supplied by the caller so this crate stays free of
/// any dependency on the model backend trait.
pub async fn run_extraction<F, Fut>(
    schema: &Schema,
    text: &str,
    initial_raw: &str,
    repair_enabled: bool,
    mut call_backend: F,
) -> (Result<Value, GatewayError>, ExtractStats)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, GatewayError>>,
{
    let mut stats = ExtractStats::default();

    let first_attempt = validate_first_matching(schema, initial_raw);
    let failure = match first_attempt {
        Ok(value) => return (Ok(value), stats),
        Err(failure) => failure,
    };

    if !repair_enabled {
        stats.failure_stage = Some(failure.stage);
        return (Err(failure.error), stats);
    }

    stats.repair_attempted = true;
    let hint = error_hint(&failure);
    let prompt = render_repair_prompt(schema, text, initial_raw, &hint);

    let repaired_raw = match call_backend(prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            stats.repair_outcome = Some(RepairOutcome::Failure);
            stats.failure_stage = Some(failure.into_repair_stage().stage);
            return (Err(e), stats);
        }
    };

    match validate_first_matching(schema, &repaired_raw) {
        Ok(value) => {
            stats.repair_outcome = Some(RepairOutcome::Success);
            (Ok(value), stats)
        }
        Err(repair_failure) => {
            let promoted = repair_failure.into_repair_stage();
            stats.repair_outcome = Some(RepairOutcome::Failure);
            stats.failure_stage = Some(promoted.stage);
            (Err(promoted.error), stats)
        }
    }
}
