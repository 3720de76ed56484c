pub mod admin;
pub mod extract;
pub mod generate;
pub mod health;
pub mod models;
pub mod schemas;
pub mod usage;

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use gateway_auth::AuthContext;
use gateway_core::GatewayError;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Extracts and gates the caller's API key from the `Authorization` header
/// (`Bearer <key>`) or `X-Api-Key`, running the full auth gate. Any
/// handler taking this extractor gets auth for free.
pub struct Authenticated(pub AuthContext);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let raw_key = bearer_or_header(parts);
        let ctx = state.auth.authenticate_and_gate(raw_key.as_deref()).await?;
        Ok(Authenticated(ctx))
    }
}

fn bearer_or_header(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(s) = value.to_str() {
            if let Some(rest) = s.strip_prefix("Bearer ") {
                return Some(rest.trim().to_string());
            }
        }
    }
    parts
        .headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// Extracts the caller's IP for the audit log.
pub fn client_host(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn require_admin(state: &AppState, auth: &AuthContext) -> Result<(), GatewayError> {
    state.auth.require_admin(auth)
}

/// `Json<T>` that renders a malformed body as the canonical
/// `validation_error` envelope instead of axum's default plain-text
/// rejection.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(_) => Err(AppError::new(GatewayError::ValidationError { fields: vec!["body".to_string()] })),
        }
    }
}
