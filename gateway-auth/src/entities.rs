use chrono::{DateTime, Utc};
use serde::Serialize;

/// Well-known role names. Any other string is accepted by the store but
/// carries no rate-limit tier of its own and falls back to `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Standard,
    Free,
}

impl Role {
    pub fn parse(raw: &str) -> Role {
        match raw {
            "admin" => Role::Admin,
            "standard" => Role::Standard,
            _ => Role::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Standard => "standard",
            Role::Free => "free",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// An authenticated API key, as loaded from the store. Never constructed
/// directly by handlers — only `AuthGate` produces one.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: String,
    pub key: String,
    pub active: bool,
    pub role: Option<String>,
    pub quota_monthly: Option<i64>,
    pub quota_used: i64,
    pub quota_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub disabled_at: Option<DateTime<Utc>>,
    pub label: Option<String>,
}

impl ApiKeyRecord {
    pub fn role(&self) -> Role {
        self.role.as_deref().map(Role::parse).unwrap_or(Role::Free)
    }

    pub fn is_usable(&self) -> bool {
        self.active && self.disabled_at.is_none()
    }

    pub fn quota_exhausted(&self) -> bool {
        match self.quota_monthly {
            Some(limit) => self.quota_used >= limit,
            None => false,
        }
    }
}

/// The authenticated, gated identity attached to a request once C5 has
/// run. This is the only thing downstream code (coordinator, audit) sees
/// of the caller's key.
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    pub api_key_id: String,
    pub role: String,
    pub label: Option<String>,
}

impl From<&ApiKeyRecord> for AuthContext {
    fn from(record: &ApiKeyRecord) -> Self {
        AuthContext {
            api_key_id: record.id.clone(),
            role: record.role().as_str().to_string(),
            label: record.label.clone(),
        }
    }
}
