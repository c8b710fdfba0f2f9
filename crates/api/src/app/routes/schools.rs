//! Superadmin school management.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use schoolbank_auth::EffectiveScope;
use schoolbank_core::SchoolId;
use schoolbank_infra::{CascadeReport, SchoolStats};
use schoolbank_ledger::{NewSchool, School};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_schools).post(create_school))
        .route("/:id", axum::routing::delete(delete_school))
        .route("/:id/stats", get(school_stats))
}

pub async fn list_schools(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<Value>, ApiError> {
    let items = services.schools().list(&scope).await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn create_school(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<NewSchool>,
) -> Result<(StatusCode, Json<School>), ApiError> {
    let school = services.schools().create(&scope, body).await?;
    Ok((StatusCode::CREATED, Json(school)))
}

pub async fn school_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<SchoolId>,
) -> Result<Json<SchoolStats>, ApiError> {
    Ok(Json(services.schools().stats(&scope, &id).await?))
}

/// DELETE /schools/:id - quarantine, then remove all tenant data.
pub async fn delete_school(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<SchoolId>,
) -> Result<Json<CascadeReport>, ApiError> {
    Ok(Json(services.schools().cascade_delete(&scope, &id).await?))
}
