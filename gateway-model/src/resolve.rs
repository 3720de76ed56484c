use crate::registry::MultiModelManager;
use gateway_core::capability::Caps;
use gateway_core::{Cap, GatewayError, Result};
use gateway_policy::PolicySnapshot;
use gateway_settings::{DeploymentCaps, Settings};

/// Chooses the model for a request: an explicit `model` override if the
/// caller gave one and it passes the allow-list and registry checks,
/// otherwise the capability-aware default.
///
/// `override_` is the request's `model` field; `cap` is `None` for routes
/// that don't need a capability-aware default.
pub fn select_model(
    override_: Option<&str>,
    cap: Option<Cap>,
    settings: &Settings,
    registry: &MultiModelManager,
) -> Result<String> {
    if let Some(id) = override_ {
        if !settings.allows_model(id) {
            return Err(GatewayError::ModelNotAllowed(id.to_string()));
        }
        if !registry.contains(id) {
            return Err(GatewayError::ModelMissing(id.to_string()));
        }
        return Ok(id.to_string());
    }

    Ok(match cap {
        Some(cap) => registry.default_for(cap),
        None => registry.default_id().to_string(),
    })
}

/// Computes the effective capability set for `model_id`: per-model caps
/// (with defaults filled) intersected with the deployment gate, then
/// overridden last by the policy snapshot.
pub fn effective_caps(
    model_id: &str,
    deployment: &DeploymentCaps,
    registry: &MultiModelManager,
    policy: &PolicySnapshot,
) -> Caps {
    let per_model = registry.meta(model_id).map(|m| m.caps.clone()).unwrap_or(Caps::Unspecified);
    let deployment_caps = Caps::Map(
        [(Cap::Generate, deployment.generate), (Cap::Extract, deployment.extract)]
            .into_iter()
            .collect(),
    );
    let mut effective = per_model.intersect(&deployment_caps);
    if let Some(overrides) = policy.extract_override_for(model_id) {
        effective = effective.override_with(&overrides);
    }
    effective
}

/// Enforces the capability gate for `cap` on `model_id`: the deployment
/// gate is checked first (so a model-level capability can never
/// resurrect a deployment-disabled route), then the effective
/// (post-policy) capability set.
pub fn require_capability(
    model_id: &str,
    cap: Cap,
    deployment: &DeploymentCaps,
    registry: &MultiModelManager,
    policy: &PolicySnapshot,
) -> Result<()> {
    let deployment_allows = match cap {
        Cap::Generate => deployment.generate,
        Cap::Extract => deployment.extract,
    };
    if !deployment_allows {
        return Err(GatewayError::CapabilityDisabled(cap.as_str().to_string()));
    }

    let effective = effective_caps(model_id, deployment, registry, policy);
    if !effective.has(cap) {
        return Err(GatewayError::CapabilityNotSupported {
            model: model_id.to_string(),
            cap: cap.as_str().to_string(),
        });
    }
    Ok(())
}
