use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, info};

use schoolbank_auth::JwtValidator;
use schoolbank_core::{DomainError, EntityKind};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::impersonation_target;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub services: Arc<AppServices>,
}

/// Authenticate the bearer token and resolve the caller's effective scope.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        DomainError::Unauthenticated
    })?;

    let impersonate = impersonation_target(req.headers())?;
    let scope = state
        .services
        .resolver()
        .resolve(&claims.identity(), impersonate.as_ref())
        .await
        .map_err(|err| match err {
            DomainError::NotFound(EntityKind::Profile) => {
                DomainError::permission_denied("no profile exists for this identity")
            }
            other => other,
        })?;

    req.extensions_mut().insert(scope);
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, DomainError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(DomainError::Unauthenticated)?;

    let header = header.to_str().map_err(|_| DomainError::Unauthenticated)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(DomainError::Unauthenticated)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(DomainError::Unauthenticated);
    }

    Ok(token)
}

/// One log line per request with its outcome.
pub async fn log_request(req: axum::extract::Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = std::time::Instant::now();

    let response = next.run(req).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}
