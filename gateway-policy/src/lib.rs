use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Allow,
    Deny,
    Unknown,
}

/// Raw, schema-versioned policy decision artifact as read from disk.
#[derive(Debug, Clone, Deserialize)]
struct RawPolicyDecision {
    #[allow(dead_code)]
    schema_version: u32,
    generated_at: DateTime<Utc>,
    policy: String,
    status: PolicyStatus,
    enable_extract: bool,
    contract_errors: u32,
    model_id: Option<String>,
}

/// Resolved view of the external policy decision artifact, with the
/// fail-closed rules already applied: `ok` and `enable_extract` reflect
/// the *effective* decision, never the raw fields alone.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyDecisionSnapshot {
    pub ok: bool,
    pub generated_at: DateTime<Utc>,
    pub policy: String,
    pub status: PolicyStatus,
    pub enable_extract: bool,
    pub contract_errors: u32,
    pub model_id: Option<String>,
    pub raw: Value,
}

impl PolicyDecisionSnapshot {
    fn from_raw(raw_value: Value) -> Result<Self, String> {
        let raw: RawPolicyDecision =
            serde_json::from_value(raw_value.clone()).map_err(|e| e.to_string())?;

        let mut ok = true;
        if raw.contract_errors > 0 {
            ok = false;
        }
        if matches!(raw.status, PolicyStatus::Deny | PolicyStatus::Unknown) {
            ok = false;
        }
        let enable_extract = ok && raw.enable_extract;

        Ok(Self {
            ok,
            generated_at: raw.generated_at,
            policy: raw.policy,
            status: raw.status,
            enable_extract,
            contract_errors: raw.contract_errors,
            model_id: raw.model_id,
            raw: raw_value,
        })
    }
}

/// The effective state of the optional external policy collaborator:
/// never configured, configured and loaded (possibly not-ok), or fail-
/// closed because the configured artifact could not be read/parsed.
#[derive(Debug, Clone)]
pub enum PolicySnapshot {
    NotConfigured,
    Loaded(PolicyDecisionSnapshot),
    FailClosed { reason: String },
}

impl PolicySnapshot {
    /// Resolves `POLICY_DECISION_PATH` and loads the artifact, applying
    /// fail-closed semantics on any read/parse error.
    pub fn load_from_env() -> Self {
        match std::env::var("POLICY_DECISION_PATH") {
            Err(_) => PolicySnapshot::NotConfigured,
            Ok(path) => Self::load_path(Path::new(&path)),
        }
    }

    pub fn load_path(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "policy decision artifact missing, failing closed");
                return PolicySnapshot::FailClosed { reason: format!("missing: {e}") };
            }
        };
        let value: Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "policy decision artifact unparseable, failing closed");
                return PolicySnapshot::FailClosed { reason: format!("unparseable: {e}") };
            }
        };
        match PolicyDecisionSnapshot::from_raw(value) {
            Ok(snap) => PolicySnapshot::Loaded(snap),
            Err(e) => {
                tracing::warn!(error = %e, "policy decision artifact invalid shape, failing closed");
                PolicySnapshot::FailClosed { reason: format!("invalid: {e}") }
            }
        }
    }

    /// The `{extract: bool}` override to merge onto a model's per-model
    /// capability map, or `None` if no override applies to `model_id`.
    pub fn extract_override_for(&self, model_id: &str) -> Option<BTreeMap<gateway_core::Cap, bool>> {
        match self {
            PolicySnapshot::NotConfigured => None,
            PolicySnapshot::FailClosed { .. } => {
                Some(BTreeMap::from([(gateway_core::Cap::Extract, false)]))
            }
            PolicySnapshot::Loaded(snap) => {
                if let Some(scope) = &snap.model_id {
                    if scope != model_id {
                        return None;
                    }
                }
                Some(BTreeMap::from([(gateway_core::Cap::Extract, snap.enable_extract)]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_artifact(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn missing_file_fails_closed() {
        let snap = PolicySnapshot::load_path(Path::new("/nonexistent/path.json"));
        assert!(matches!(snap, PolicySnapshot::FailClosed { .. }));
        assert_eq!(snap.extract_override_for("m1"), Some(BTreeMap::from([(gateway_core::Cap::Extract, false)])));
    }

    #[test]
    fn unparseable_file_fails_closed() {
        let f = write_artifact("not json");
        let snap = PolicySnapshot::load_path(f.path());
        assert!(matches!(snap, PolicySnapshot::FailClosed { .. }));
    }

    #[test]
    fn contract_errors_force_not_ok() {
        let json = serde_json::json!({
            "schema_version": 1,
            "generated_at": "2026-01-01T00:00:00Z",
            "policy": "p1",
            "status": "allow",
            "enable_extract": true,
            "contract_errors": 2,
        })
        .to_string();
        let f = write_artifact(&json);
        let snap = PolicySnapshot::load_path(f.path());
        match snap {
            PolicySnapshot::Loaded(d) => {
                assert!(!d.ok);
                assert!(!d.enable_extract);
            }
            _ => panic!("expected Loaded"),
        }
    }

    #[test]
    fn deny_status_disables_extract_for_all_models() {
        let json = serde_json::json!({
            "schema_version": 1,
            "generated_at": "2026-01-01T00:00:00Z",
            "policy": "p1",
            "status": "deny",
            "enable_extract": true,
            "contract_errors": 0,
        })
        .to_string();
        let f = write_artifact(&json);
        let snap = PolicySnapshot::load_path(f.path());
        let ov = snap.extract_override_for("any-model").unwrap();
        assert_eq!(ov.get(&gateway_core::Cap::Extract), Some(&false));
    }

    #[test]
    fn scoped_to_other_model_is_a_no_op() {
        let json = serde_json::json!({
            "schema_version": 1,
            "generated_at": "2026-01-01T00:00:00Z",
            "policy": "p1",
            "status": "allow",
            "enable_extract": false,
            "contract_errors": 0,
            "model_id": "other-model",
        })
        .to_string();
        let f = write_artifact(&json);
        let snap = PolicySnapshot::load_path(f.path());
        assert_eq!(snap.extract_override_for("my-model"), None);
    }

    #[test]
    fn not_configured_is_a_no_op() {
        let snap = PolicySnapshot::NotConfigured;
        assert_eq!(snap.extract_override_for("m1"), None);
    }
}
