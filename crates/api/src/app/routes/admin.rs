//! Admin routes: the privileged provisioning boundary.
//!
//! Every handler re-checks the caller server-side; the provisioning service
//! enforces the role hierarchy and tenant boundary.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use schoolbank_auth::{EffectiveScope, Profile, Role};
use schoolbank_core::{DomainError, UserId};
use schoolbank_infra::{NewStaffMember, Provisioned};

use crate::app::dto::{TeacherClassesRequest, TeachersQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", delete(delete_user))
        .route("/users/:id/classes", axum::routing::put(update_classes))
        .route("/invitations", post(invite_user))
        .route("/teachers", get(list_teachers))
        .route("/orphaned-identities", get(orphaned_identities))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /admin/users - create identity + profile
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<NewStaffMember>,
) -> Result<(StatusCode, Json<Provisioned>), ApiError> {
    authz::require_roles(&scope, &[Role::Admin])?;
    let created = services
        .provisioning()
        .create_identity_and_profile(&scope, body)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /admin/invitations - pending profile, linked on first login
pub async fn invite_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<NewStaffMember>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    authz::require_roles(&scope, &[Role::Admin])?;
    let profile = services.provisioning().invite_profile(&scope, body).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// DELETE /admin/users/:id
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    authz::require_roles(&scope, &[Role::Admin])?;
    services.provisioning().delete_profile(&scope, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /admin/users/:id/classes
pub async fn update_classes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<UserId>,
    Json(body): Json<TeacherClassesRequest>,
) -> Result<Json<Profile>, ApiError> {
    authz::require_roles(&scope, &[Role::Admin])?;
    let profile = services
        .provisioning()
        .update_teacher_classes(&scope, &id, body.classes)
        .await?;
    Ok(Json(profile))
}

/// GET /admin/teachers?schoolId= - the caller's school unless a superadmin
/// names another.
pub async fn list_teachers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Query(query): Query<TeachersQuery>,
) -> Result<Json<Value>, ApiError> {
    authz::require_roles(&scope, &[Role::Admin])?;
    let school_id = match (query.school_id, scope.role()) {
        (Some(requested), Role::SuperAdmin) => requested,
        (Some(requested), _) if Some(&requested) != scope.school_id() => {
            return Err(DomainError::permission_denied("teachers of another school").into());
        }
        _ => scope.require_school()?.clone(),
    };
    let items = services.profiles().teachers(&school_id).await?;
    Ok(Json(json!({ "items": items })))
}

/// GET /admin/orphaned-identities - reconciliation report
pub async fn orphaned_identities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<Value>, ApiError> {
    let items = services.provisioning().find_orphaned_identities(&scope).await?;
    Ok(Json(json!({ "items": items })))
}
