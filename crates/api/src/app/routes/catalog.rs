//! Classes, subjects, rewards and quick rewards.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde_json::{json, Value};

use schoolbank_auth::{EffectiveScope, Permission};
use schoolbank_core::{ClassId, RewardId, SubjectId};
use schoolbank_ledger::{
    Class, NewClass, NewQuickReward, NewReward, NewSubject, QuickReward, Reward, RewardUpdate,
    Subject,
};

use crate::app::dto::RenameRequest;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/classes", get(list_classes).post(create_class))
        .route("/classes/:id", patch(rename_class).delete(delete_class))
        .route("/subjects", get(list_subjects).post(create_subject))
        .route("/subjects/:id", patch(rename_subject).delete(delete_subject))
        .route("/rewards", get(list_rewards).post(create_reward))
        .route("/rewards/:id", patch(update_reward))
        .route("/quick-rewards", get(list_quick_rewards).post(create_quick_reward))
}

// ─────────────────────────────────────────────────────────────────────────────
// Classes
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_classes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<Value>, ApiError> {
    authz::require(&scope, &authz::READ_CLASSES)?;
    let items = services.repo(&scope)?.classes().await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn create_class(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<NewClass>,
) -> Result<(StatusCode, Json<Class>), ApiError> {
    authz::require(&scope, &[Permission::MANAGE_CLASSES])?;
    let class = services.repo(&scope)?.create_class(body).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

pub async fn rename_class(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<ClassId>,
    Json(body): Json<RenameRequest>,
) -> Result<Json<Class>, ApiError> {
    authz::require(&scope, &[Permission::MANAGE_CLASSES])?;
    Ok(Json(services.repo(&scope)?.rename_class(&id, &body.name).await?))
}

pub async fn delete_class(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<ClassId>,
) -> Result<StatusCode, ApiError> {
    authz::require(&scope, &[Permission::MANAGE_CLASSES])?;
    services.repo(&scope)?.delete_class(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Subjects
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_subjects(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<Value>, ApiError> {
    authz::require(&scope, &authz::READ_CATALOG)?;
    let items = services.repo(&scope)?.subjects().await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn create_subject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<NewSubject>,
) -> Result<(StatusCode, Json<Subject>), ApiError> {
    authz::require(&scope, &[Permission::MANAGE_SUBJECTS])?;
    let subject = services.repo(&scope)?.create_subject(body).await?;
    Ok((StatusCode::CREATED, Json(subject)))
}

pub async fn rename_subject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<SubjectId>,
    Json(body): Json<RenameRequest>,
) -> Result<Json<Subject>, ApiError> {
    authz::require(&scope, &[Permission::MANAGE_SUBJECTS])?;
    Ok(Json(services.repo(&scope)?.rename_subject(&id, &body.name).await?))
}

pub async fn delete_subject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<SubjectId>,
) -> Result<StatusCode, ApiError> {
    authz::require(&scope, &[Permission::MANAGE_SUBJECTS])?;
    services.repo(&scope)?.delete_subject(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Rewards
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_rewards(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<Value>, ApiError> {
    authz::require(&scope, &authz::READ_CATALOG)?;
    let items = services.repo(&scope)?.rewards().await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn create_reward(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<NewReward>,
) -> Result<(StatusCode, Json<Reward>), ApiError> {
    authz::require(&scope, &[Permission::MANAGE_REWARDS])?;
    let reward = services.repo(&scope)?.create_reward(body).await?;
    Ok((StatusCode::CREATED, Json(reward)))
}

pub async fn update_reward(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<RewardId>,
    Json(body): Json<RewardUpdate>,
) -> Result<Json<Reward>, ApiError> {
    authz::require(&scope, &[Permission::MANAGE_REWARDS])?;
    Ok(Json(services.repo(&scope)?.update_reward(&id, body).await?))
}

pub async fn list_quick_rewards(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<Value>, ApiError> {
    authz::require(&scope, &authz::READ_CATALOG)?;
    let items = services.repo(&scope)?.quick_rewards().await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn create_quick_reward(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<NewQuickReward>,
) -> Result<(StatusCode, Json<QuickReward>), ApiError> {
    authz::require(&scope, &[Permission::MANAGE_REWARDS])?;
    let quick = services.repo(&scope)?.create_quick_reward(body).await?;
    Ok((StatusCode::CREATED, Json(quick)))
}
