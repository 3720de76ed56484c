use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::GatewayError;

/// Wraps `GatewayError` so it can be returned directly from an axum
/// handler; the `IntoResponse` impl is the one place that renders the
/// canonical `{code, message, extra?, request_id?}` envelope onto the
/// wire.
pub struct AppError {
    inner: GatewayError,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: GatewayError) -> Self {
        Self { inner, request_id: None }
    }

    pub fn with_request_id(inner: GatewayError, request_id: impl Into<String>) -> Self {
        Self { inner, request_id: Some(request_id.into()) }
    }
}

impl From<GatewayError> for AppError {
    fn from(inner: GatewayError) -> Self {
        Self::new(inner)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = self.inner.code(), error = %self.inner, "request failed");
        } else {
            tracing::warn!(code = self.inner.code(), error = %self.inner, "request rejected");
        }
        let envelope = self.inner.into_envelope(self.request_id);
        (status, Json(envelope)).into_response()
    }
}
