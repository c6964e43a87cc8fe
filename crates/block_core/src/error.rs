use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The gateway's full error taxonomy. Every fallible operation in the
/// request engine ends up here; internal errors from collaborators are
/// downgraded to `StoreFatal`/`AuthUpstream` with the original chain kept
/// for logging via `tracing::error!`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Quota reached")]
    QuotaReached,

    #[error("If-Match precondition failed")]
    PreconditionFailed { current_etag: Option<String> },

    #[error("File not found")]
    NotFound,

    #[error("auth upstream error: {0}")]
    AuthUpstream(String),

    #[error("object store error: {0}")]
    StoreFatal(#[source] anyhow::Error),
}

impl GatewayError {
    /// Short machine-readable code, used both as the metrics label and the
    /// JSON error body's `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::QuotaReached => "forbidden_quota",
            GatewayError::PreconditionFailed { .. } => "precondition_failed",
            GatewayError::NotFound => "not_found",
            GatewayError::AuthUpstream(_) => "auth_upstream",
            GatewayError::StoreFatal(_) => "store_fatal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::FORBIDDEN,
            GatewayError::QuotaReached => StatusCode::PAYMENT_REQUIRED,
            GatewayError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::AuthUpstream(_) | GatewayError::StoreFatal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for GatewayError {
    /// Collaborators (`block_store`, `block_db`, `block_auth`) raise
    /// specific `GatewayError`s via `anyhow::bail!` so the variant survives
    /// the `?` conversion through their `anyhow::Result` return types;
    /// anything else is a genuine unexpected failure.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<GatewayError>() {
            Ok(gateway_err) => gateway_err,
            Err(err) => GatewayError::StoreFatal(err),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::warn!(error = %self, code = self.code(), "request rejected");
        }
        let code = self.code();
        let etag = match &self {
            GatewayError::PreconditionFailed { current_etag } => current_etag.clone(),
            _ => None,
        };
        let body = Json(ErrorBody {
            error: code,
            message: self.to_string(),
        });
        let mut response = (status, body).into_response();
        if let Some(etag) = etag {
            if let Ok(value) = axum::http::HeaderValue::from_str(&etag) {
                response.headers_mut().insert(axum::http::header::ETAG, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_status_codes() {
        assert_eq!(GatewayError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::QuotaReached.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            GatewayError::PreconditionFailed { current_etag: None }.status(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(GatewayError::NotFound.status(), StatusCode::NOT_FOUND);
    }
}
