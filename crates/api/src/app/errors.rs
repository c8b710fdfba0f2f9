//! Consistent JSON error responses.
//!
//! Every failure leaves the API as `{"error", "message", "retryable"}` so the
//! caller can decide whether to retry, correct input, or stop.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use schoolbank_auth::AuthzError;
use schoolbank_core::{DomainError, ErrorKind};

/// A [`DomainError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        Self(value)
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        Self(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        domain_error_to_response(self.0)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyExists | ErrorKind::InvalidRequestState => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let kind = err.kind();
    if kind == ErrorKind::Internal {
        tracing::error!(error = %err, "request failed");
    }
    json_error(status_for(kind), kind.as_str(), err.to_string(), err.is_retryable())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    retryable: bool,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "retryable": retryable,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use schoolbank_core::EntityKind;

    use super::*;

    #[test]
    fn every_kind_has_its_status() {
        let cases = [
            (DomainError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (DomainError::permission_denied("no"), StatusCode::FORBIDDEN),
            (DomainError::NoTenantContext, StatusCode::FORBIDDEN),
            (DomainError::NotFound(EntityKind::Student), StatusCode::NOT_FOUND),
            (DomainError::invalid_argument("bad"), StatusCode::BAD_REQUEST),
            (DomainError::already_exists("dup"), StatusCode::CONFLICT),
            (DomainError::invalid_request_state("done"), StatusCode::CONFLICT),
            (DomainError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }
}
