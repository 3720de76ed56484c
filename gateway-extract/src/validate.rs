use crate::schema::{delimiters, Schema};
use gateway_core::GatewayError;
use serde_json::Value;

const PREVIEW_LEN: usize = 200;

fn preview(s: &str) -> String {
    if s.chars().count() <= PREVIEW_LEN {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(PREVIEW_LEN).collect();
        format!("{truncated}...")
    }
}

/// The pipeline stage a failure occurred at, for metrics labeling only.
/// Never surfaced on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Validate,
    RepairParse,
    RepairValidate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Validate => "validate",
            Stage::RepairParse => "repair_parse",
            Stage::RepairValidate => "repair_validate",
        }
    }

    fn promote_to_repair(self) -> Stage {
        match self {
            Stage::Parse => Stage::RepairParse,
            Stage::Validate => Stage::RepairValidate,
            other => other,
        }
    }
}

#[derive(Debug)]
pub struct ValidationFailure {
    pub error: GatewayError,
    pub stage: Stage,
}

impl ValidationFailure {
    pub fn into_repair_stage(mut self) -> Self {
        self.stage = self.stage.promote_to_repair();
        self
    }
}

/// Strict JSON decode: rejects code fences anywhere in the input,
/// requires the whole trimmed string to be a single top-level JSON
/// object, and rejects trailing non-whitespace. `serde_json` already
/// rejects `NaN`/`Infinity` literals by default (they are not valid JSON
/// tokens), so no extra check is needed for those.
pub fn strict_decode_object(s: &str) -> Result<Value, String> {
    let trimmed = s.trim();
    if trimmed.contains("```") {
        return Err("code fence present".to_string());
    }
    let mut de = serde_json::Deserializer::from_str(trimmed);
    let value: Value = Value::deserialize(&mut de).map_err(|e| e.to_string())?;
    de.end().map_err(|_| "trailing data after top-level value".to_string())?;
    if !value.is_object() {
        return Err("top-level value is not an object".to_string());
    }
    Ok(value)
}

use serde::Deserialize;

fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_prefix("```json").or_else(|| s.strip_prefix("```")).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

fn extract_delimited(s: &str) -> Option<&str> {
    let (open, close) = delimiters();
    let start = s.find(open)? + open.len();
    let end = s[start..].find(close)? + start;
    Some(s[start..end].trim())
}

/// Finds the matching closing brace for the `{` at byte index `start`,
/// respecting string literals and escape sequences. Returns `None` if
/// the braces never balance before the end of the string.
fn find_balanced_end(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Streaming scan for JSON objects: repeatedly locates the next `{` and
/// attempts to decode a balanced span starting there. Array/scalar-rooted
/// values can never appear here since every candidate span starts at
/// `{`; a decode failure advances one character rather than past the
/// whole span.
pub fn scan_json_objects(s: &str) -> Vec<Value> {
    let mut found = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = find_balanced_end(s, i) {
                if let Ok(value) = serde_json::from_str::<Value>(&s[i..=end]) {
                    if value.is_object() {
                        found.push(value);
                    }
                    i = end + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
    found
}

/// Tries the delimited span first, then falls back to scanning the whole
/// output for the first JSON object that validates against `schema`.
pub fn validate_first_matching(schema: &Schema, raw_output: &str) -> Result<Value, ValidationFailure> {
    let trimmed = raw_output.trim();
    if trimmed.is_empty() {
        return Err(ValidationFailure {
            error: GatewayError::InvalidJson { preview: String::new() },
            stage: Stage::Parse,
        });
    }

    if let Some(inner) = extract_delimited(trimmed) {
        let stripped = strip_code_fences(inner);
        if let Ok(candidate) = serde_json::from_str::<Value>(stripped) {
            if candidate.is_object() && schema.is_valid(&candidate) {
                return Ok(candidate);
            }
        }
        // Any failure here falls through to the general scan below.
    }

    let candidates = scan_json_objects(trimmed);
    if candidates.is_empty() {
        return Err(ValidationFailure {
            error: GatewayError::InvalidJson { preview: preview(trimmed) },
            stage: Stage::Parse,
        });
    }

    let mut last_errors = Vec::new();
    for candidate in &candidates {
        if schema.is_valid(candidate) {
            return Ok(candidate.clone());
        }
        last_errors = schema.validation_errors(candidate);
    }

    Err(ValidationFailure {
        error: GatewayError::SchemaValidationFailed { errors: last_errors, preview: preview(trimmed) },
        stage: Stage::Validate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_requires_a_int_no_extra() -> Schema {
        Schema::compile(
            "s1",
            json!({
                "type": "object",
                "properties": {"a": {"type": "integer"}},
                "required": ["a"],
                "additionalProperties": false,
            }),
        )
        .unwrap()
    }

    #[test]
    fn empty_output_is_invalid_json() {
        let schema = schema_requires_a_int_no_extra();
        let err = validate_first_matching(&schema, "   ").unwrap_err();
        assert_eq!(err.error.code(), "invalid_json");
    }

    #[test]
    fn delimited_valid_object_is_returned() {
        let schema = schema_requires_a_int_no_extra();
        let raw = "<<<JSON>>>\n{\"a\": 1}\n<<<END>>>";
        let v = validate_first_matching(&schema, raw).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn scan_returns_first_validating_object_not_first_object() {
        let schema = schema_requires_a_int_no_extra();
        let raw = "here is some prose {\"a\": 1, \"extra\": \"x\"} and then {\"a\": 1}";
        let v = validate_first_matching(&schema, raw).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn no_object_found_is_invalid_json_not_schema_failure() {
        let schema = schema_requires_a_int_no_extra();
        let err = validate_first_matching(&schema, "no json here at all").unwrap_err();
        assert_eq!(err.error.code(), "invalid_json");
    }

    #[test]
    fn objects_present_but_none_valid_is_schema_validation_failed() {
        let schema = schema_requires_a_int_no_extra();
        let err = validate_first_matching(&schema, "{\"a\": \"not-an-int\"}").unwrap_err();
        assert_eq!(err.error.code(), "schema_validation_failed");
    }

    #[test]
    fn scan_skips_unbalanced_then_finds_valid_object() {
        let schema = schema_requires_a_int_no_extra();
        let raw = "{unbalanced then {\"a\": 2}";
        let v = validate_first_matching(&schema, raw).unwrap();
        assert_eq!(v, json!({"a": 2}));
    }

    #[test]
    fn strict_decode_rejects_code_fence() {
        assert!(strict_decode_object("```json\n{\"a\":1}\n```").is_err());
    }

    #[test]
    fn strict_decode_rejects_trailing_data() {
        assert!(strict_decode_object("{\"a\":1} garbage").is_err());
    }

    #[test]
    fn strict_decode_accepts_clean_object() {
        let v = strict_decode_object(" {\"a\":1} ").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }
}
