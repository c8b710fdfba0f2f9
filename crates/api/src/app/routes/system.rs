use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};
use serde_json::{json, Value};

use schoolbank_auth::{EffectiveScope, ImpersonationContext};
use schoolbank_infra::TenantStats;

use crate::app::dto::ImpersonationRequest;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(scope): Extension<EffectiveScope>) -> Json<Value> {
    Json(json!({
        "userId": scope.user_id(),
        "email": scope.identity().email,
        "name": scope.display_name(),
        "role": scope.role(),
        "realRole": scope.real_role(),
        "schoolId": scope.school_id(),
        "impersonating": scope.is_impersonating(),
    }))
}

/// POST /impersonation - validate an impersonation target.
///
/// The server keeps no session: the client stores the returned context and
/// sends the school id on later requests.
pub async fn start_impersonation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<ImpersonationRequest>,
) -> Result<Json<ImpersonationContext>, ApiError> {
    let ctx = services
        .resolver()
        .impersonation_for(scope.real_role(), &body.school_id)
        .await?;
    Ok(Json(ctx))
}

/// GET /stats - dashboard figures for the caller's school.
pub async fn tenant_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<TenantStats>, ApiError> {
    authz::require(&scope, &authz::READ_STATS)?;
    Ok(Json(services.repo(&scope)?.stats().await?))
}
