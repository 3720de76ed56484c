use gateway_core::{GatewayError, SchemaId};
use serde_json::Value;

/// A registered, pre-loaded extraction schema. Loading schemas from disk
/// is not this type's concern; callers construct this from an
/// already-parsed JSON Schema document.
pub struct Schema {
    pub id: SchemaId,
    pub document: Value,
    validator: jsonschema::Validator,
}

impl Schema {
    pub fn compile(id: impl Into<SchemaId>, document: Value) -> Result<Self, GatewayError> {
        let validator = jsonschema::validator_for(&document)
            .map_err(|e| GatewayError::ModelConfigInvalid(format!("invalid schema: {e}")))?;
        Ok(Self { id: id.into(), document, validator })
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Validation error paths, in encounter order, suitable for the
    /// `schema_validation_failed` error envelope.
    pub fn validation_errors(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|e| e.instance_path.to_string())
            .collect()
    }

    /// Compact summary rendered into the extraction/repair prompts:
    /// required fields, field types/enums/patterns/descriptions, and the
    /// `additionalProperties: false` constraint when present.
    pub fn summary(&self) -> String {
        let obj = match self.document.as_object() {
            Some(o) => o,
            None => return "{}".to_string(),
        };

        let required: Vec<&str> =
            obj.get("required").and_then(Value::as_array).map(|a| a.iter().filter_map(Value::as_str).collect()).unwrap_or_default();

        let mut lines = Vec::new();
        if !required.is_empty() {
            lines.push(format!("required: {}", required.join(", ")));
        }

        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            for (name, schema) in props {
                lines.push(describe_field(name, schema));
            }
        }

        if obj.get("additionalProperties") == Some(&Value::Bool(false)) {
            lines.push("additionalProperties: false".to_string());
        }

        lines.join("\n")
    }
}

fn describe_field(name: &str, schema: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(ty) = schema.get("type").and_then(Value::as_str) {
        parts.push(format!("type={ty}"));
    }
    if let Some(en) = schema.get("enum").and_then(Value::as_array) {
        let values: Vec<String> = en.iter().map(|v| v.to_string()).collect();
        parts.push(format!("enum=[{}]", values.join(",")));
    }
    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        parts.push(format!("pattern={pattern}"));
    }
    if let Some(desc) = schema.get("description").and_then(Value::as_str) {
        parts.push(format!("description={desc}"));
    }
    format!("- {name}: {}", parts.join(", "))
}

const DELIMITER_OPEN: &str = "<<<JSON>>>";
const DELIMITER_CLOSE: &str = "<<<END>>>";

/// Renders the extraction prompt: instruction block, delimiter pair,
/// schema summary, and input text.
pub fn render_extraction_prompt(schema: &Schema, text: &str) -> String {
    format!(
        "Extract a single JSON object matching the schema below from the input text.\n\
         Respond with ONLY the JSON object between the delimiters. Do not use markdown, \
         code fences, or any commentary before or after the delimiters.\n\n\
         Schema ({}):\n{}\n\n\
         {DELIMITER_OPEN}\n{{...}}\n{DELIMITER_CLOSE}\n\n\
         Input:\n{text}",
        schema.id,
        schema.summary(),
    )
}

/// Renders the one-shot repair prompt: schema summary, input text, the
/// previous (bad) output, and a structured error hint.
pub fn render_repair_prompt(schema: &Schema, text: &str, previous_output: &str, error_hint: &Value) -> String {
    format!(
        "The previous extraction attempt did not produce a valid JSON object for this schema.\n\
         Fix it and respond with ONLY the corrected JSON object between the delimiters. \
         Do not use markdown, code fences, or commentary.\n\n\
         Schema ({}):\n{}\n\n\
         Previous output:\n{previous_output}\n\n\
         Error:\n{}\n\n\
         {DELIMITER_OPEN}\n{{...}}\n{DELIMITER_CLOSE}\n\n\
         Input:\n{text}",
        schema.id,
        schema.summary(),
        error_hint,
    )
}

pub fn delimiters() -> (&'static str, &'static str) {
    (DELIMITER_OPEN, DELIMITER_CLOSE)
}
