use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// One of the two permissions a model may grant for a given route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cap {
    Generate,
    Extract,
}

impl Cap {
    pub const ALL: [Cap; 2] = [Cap::Generate, Cap::Extract];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cap::Generate => "generate",
            Cap::Extract => "extract",
        }
    }
}

/// Raw, source-shaped per-model capability metadata as it may appear in
/// `models.yaml`: absent, a list/set of allowed capabilities, a full
/// dict, or a single capability name. Normalized once into [`Caps`] at
/// registry build time; downstream code only ever sees the normalized
/// variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCapsMeta {
    AllowList(Vec<String>),
    Map(BTreeMap<String, bool>),
    Single(String),
}

/// Normalized capability set for a single model. `has()` is the single
/// entry point every consumer uses; nothing downstream matches on the
/// variant directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Caps {
    /// No metadata was present: every capability is allowed.
    Unspecified,
    /// Only capabilities in the set are allowed; absent ones are denied.
    AllowList(BTreeSet<Cap>),
    /// Explicit per-capability booleans; a key missing from the map
    /// defaults to `true` so partial configs never silently disable.
    Map(BTreeMap<Cap, bool>),
}

impl Caps {
    pub fn has(&self, cap: Cap) -> bool {
        match self {
            Caps::Unspecified => true,
            Caps::AllowList(set) => set.contains(&cap),
            Caps::Map(map) => map.get(&cap).copied().unwrap_or(true),
        }
    }

    /// Combine two capability sets, intersecting them (`⊓`): a capability
    /// is allowed only if both sides allow it.
    pub fn intersect(&self, other: &Caps) -> Caps {
        let mut map = BTreeMap::new();
        for cap in Cap::ALL {
            map.insert(cap, self.has(cap) && other.has(cap));
        }
        Caps::Map(map)
    }

    /// Apply a policy override on top of this set: every key the override
    /// names replaces the existing value; anything it's silent on is left
    /// untouched.
    pub fn override_with(&self, overrides: &BTreeMap<Cap, bool>) -> Caps {
        let mut map = BTreeMap::new();
        for cap in Cap::ALL {
            map.insert(cap, overrides.get(&cap).copied().unwrap_or_else(|| self.has(cap)));
        }
        Caps::Map(map)
    }

    pub fn from_raw(raw: Option<RawCapsMeta>) -> Self {
        match raw {
            None => Caps::Unspecified,
            Some(RawCapsMeta::AllowList(list)) => {
                Caps::AllowList(list.iter().filter_map(|s| parse_cap(s)).collect())
            }
            Some(RawCapsMeta::Map(map)) => {
                Caps::Map(map.into_iter().filter_map(|(k, v)| parse_cap(&k).map(|c| (c, v))).collect())
            }
            Some(RawCapsMeta::Single(s)) => match parse_cap(&s) {
                Some(c) => Caps::AllowList([c].into_iter().collect()),
                // Unrecognized capability name: fail open rather than silently deny everything.
                None => Caps::Unspecified,
            },
        }
    }
}

fn parse_cap(s: &str) -> Option<Cap> {
    match s {
        "generate" => Some(Cap::Generate),
        "extract" => Some(Cap::Extract),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_allows_all() {
        let c = Caps::Unspecified;
        assert!(c.has(Cap::Generate));
        assert!(c.has(Cap::Extract));
    }

    #[test]
    fn map_defaults_missing_keys_true() {
        let mut map = BTreeMap::new();
        map.insert(Cap::Extract, false);
        let c = Caps::Map(map);
        assert!(c.has(Cap::Generate));
        assert!(!c.has(Cap::Extract));
    }

    #[test]
    fn allow_list_denies_absent() {
        let c = Caps::AllowList([Cap::Generate].into_iter().collect());
        assert!(c.has(Cap::Generate));
        assert!(!c.has(Cap::Extract));
    }

    #[test]
    fn intersect_is_conjunction() {
        let per_model = Caps::Unspecified;
        let deployment = Caps::AllowList([Cap::Generate].into_iter().collect());
        let eff = per_model.intersect(&deployment);
        assert!(eff.has(Cap::Generate));
        assert!(!eff.has(Cap::Extract));
    }

    #[test]
    fn override_wins_last() {
        let eff = Caps::AllowList([Cap::Generate, Cap::Extract].into_iter().collect());
        let mut overrides = BTreeMap::new();
        overrides.insert(Cap::Extract, false);
        let result = eff.override_with(&overrides);
        assert!(result.has(Cap::Generate));
        assert!(!result.has(Cap::Extract));
    }

    #[test]
    fn single_string_normalizes_to_allow_list() {
        let raw = Some(RawCapsMeta::Single("generate".to_string()));
        let c = Caps::from_raw(raw);
        assert!(c.has(Cap::Generate));
        assert!(!c.has(Cap::Extract));
    }
}
