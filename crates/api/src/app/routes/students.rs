use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use schoolbank_auth::{EffectiveScope, Permission};
use schoolbank_core::StudentId;
use schoolbank_ledger::{NewStudent, Student, StudentUpdate};

use crate::app::dto::{AdjustBalanceRequest, StudentsQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_students).post(create_student))
        .route(
            "/:id",
            get(get_student).patch(update_student).delete(delete_student),
        )
        .route("/:id/adjust", post(adjust_balance))
}

/// GET /students - by name, optionally one class or one NFC tag.
pub async fn list_students(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Query(query): Query<StudentsQuery>,
) -> Result<Json<Value>, ApiError> {
    authz::require(&scope, &authz::READ_STUDENTS)?;
    let repo = services.repo(&scope)?;
    let items = match &query.nfc_tag {
        Some(tag) => repo.student_by_nfc(tag).await?.into_iter().collect(),
        None => repo.students(query.class_id.as_ref()).await?,
    };
    Ok(Json(json!({ "items": items })))
}

pub async fn create_student(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<NewStudent>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    authz::require(&scope, &[Permission::MANAGE_STUDENTS])?;
    let student = services.repo(&scope)?.create_student(body).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn get_student(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<StudentId>,
) -> Result<Json<Student>, ApiError> {
    authz::require(&scope, &authz::READ_STUDENTS)?;
    Ok(Json(services.repo(&scope)?.get(&id).await?))
}

pub async fn update_student(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<StudentId>,
    Json(body): Json<StudentUpdate>,
) -> Result<Json<Student>, ApiError> {
    authz::require(&scope, &[Permission::MANAGE_STUDENTS])?;
    Ok(Json(services.repo(&scope)?.update_student(&id, body).await?))
}

pub async fn delete_student(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<StudentId>,
) -> Result<StatusCode, ApiError> {
    authz::require(&scope, &[Permission::MANAGE_STUDENTS])?;
    services.repo(&scope)?.delete_student(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /students/:id/adjust - out-of-band balance correction.
pub async fn adjust_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<StudentId>,
    Json(body): Json<AdjustBalanceRequest>,
) -> Result<Json<Value>, ApiError> {
    let balance = services.engine().adjust_balance(&scope, &id, body.delta).await?;
    Ok(Json(json!({ "studentId": id, "balance": balance })))
}
