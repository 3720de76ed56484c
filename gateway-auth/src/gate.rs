use crate::entities::AuthContext;
use crate::rate_limit::RateLimiter;
use crate::store::ApiKeyStore;
use gateway_core::GatewayError;
use gateway_settings::RateLimits;

/// Authenticates, rate-gates and quota-gates a caller, in that order.
pub struct AuthGate {
    store: ApiKeyStore,
    limiter: RateLimiter,
}

impl AuthGate {
    pub fn new(store: ApiKeyStore, rate_limits: RateLimits) -> Self {
        Self { store, limiter: RateLimiter::new(rate_limits) }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        self.store.migrate().await
    }

    /// Runs the full gate. `raw_key` is the bearer/header value, already
    /// stripped of any `Bearer ` prefix by the HTTP layer.
    pub async fn authenticate_and_gate(&self, raw_key: Option<&str>) -> Result<AuthContext, GatewayError> {
        let key = raw_key.filter(|k| !k.is_empty()).ok_or(GatewayError::MissingApiKey)?;

        let record = self
            .store
            .find_by_key(key)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?
            .ok_or(GatewayError::InvalidApiKey)?;

        if !record.is_usable() {
            return Err(GatewayError::InvalidApiKey);
        }

        self.limiter
            .check(&record.id, record.role())
            .map_err(|retry_after_secs| GatewayError::RateLimited { retry_after_secs })?;

        if record.quota_exhausted() {
            return Err(GatewayError::QuotaExhausted);
        }

        Ok(AuthContext::from(&record))
    }

    /// Consumes one unit of quota for a billable request, gating the
    /// backend call rather than following it: the caller must not produce
    /// a response until this returns `Ok`. The underlying `UPDATE` is
    /// atomic, so this is also what makes two concurrent requests against
    /// the last unit of quota serialize instead of both succeeding. A
    /// cache hit on a route whose policy treats hits as non-billable
    /// should not call this.
    pub async fn consume_quota(&self, key: &str) -> Result<(), GatewayError> {
        let consumed = self.store.consume_quota(key).await.map_err(|e| GatewayError::Internal(e.to_string()))?;
        if !consumed {
            return Err(GatewayError::QuotaExhausted);
        }
        Ok(())
    }

    pub fn require_admin(&self, ctx: &AuthContext) -> Result<(), GatewayError> {
        if ctx.role == "admin" {
            Ok(())
        } else {
            Err(GatewayError::Forbidden)
        }
    }

    pub fn store(&self) -> &ApiKeyStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn gate() -> AuthGate {
        let store = ApiKeyStore::connect("sqlite::memory:").await.unwrap();
        let limits = RateLimits { admin: None, standard: 60, free: 10 };
        let gate = AuthGate::new(store, limits);
        gate.migrate().await.unwrap();
        gate
    }

    #[tokio::test]
    async fn missing_header_is_missing_api_key() {
        let gate = gate().await;
        let err = gate.authenticate_and_gate(None).await.unwrap_err();
        assert_eq!(err.code(), "missing_api_key");
    }

    #[tokio::test]
    async fn unknown_key_is_invalid_api_key() {
        let gate = gate().await;
        let err = gate.authenticate_and_gate(Some("nope")).await.unwrap_err();
        assert_eq!(err.code(), "invalid_api_key");
    }

    #[tokio::test]
    async fn disabled_key_is_invalid_api_key() {
        let gate = gate().await;
        gate.store().create("k1", Some("standard"), None, None).await.unwrap();
        gate.store().disable("k1").await.unwrap();
        let err = gate.authenticate_and_gate(Some("k1")).await.unwrap_err();
        assert_eq!(err.code(), "invalid_api_key");
    }

    #[tokio::test]
    async fn exhausted_quota_is_quota_exhausted() {
        let gate = gate().await;
        gate.store().create("k1", Some("standard"), Some(1), None).await.unwrap();
        gate.consume_quota("k1").await.unwrap();
        let err = gate.authenticate_and_gate(Some("k1")).await.unwrap_err();
        assert_eq!(err.code(), "quota_exhausted");
    }

    #[tokio::test]
    async fn healthy_key_passes_the_gate() {
        let gate = gate().await;
        gate.store().create("k1", Some("standard"), Some(10), None).await.unwrap();
        let ctx = gate.authenticate_and_gate(Some("k1")).await.unwrap();
        assert_eq!(ctx.role, "standard");
    }

    #[tokio::test]
    async fn consume_quota_errors_once_the_limit_is_reached() {
        let gate = gate().await;
        gate.store().create("k1", Some("standard"), Some(1), None).await.unwrap();
        gate.consume_quota("k1").await.unwrap();
        let err = gate.consume_quota("k1").await.unwrap_err();
        assert_eq!(err.code(), "quota_exhausted");
    }

    #[tokio::test]
    async fn non_admin_role_is_rejected_from_admin_endpoints() {
        let gate = gate().await;
        gate.store().create("k1", Some("standard"), None, None).await.unwrap();
        let ctx = gate.authenticate_and_gate(Some("k1")).await.unwrap();
        assert!(gate.require_admin(&ctx).is_err());
    }
}
