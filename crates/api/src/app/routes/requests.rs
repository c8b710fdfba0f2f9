//! Reward redemption requests.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use schoolbank_auth::EffectiveScope;
use schoolbank_core::RewardRequestId;
use schoolbank_infra::Approval;
use schoolbank_ledger::RewardRequest;

use crate::app::dto::{CreateRewardRequest, RejectRequest, RequestsQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
}

/// GET /reward-requests?status= - pending unless asked otherwise.
pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Query(query): Query<RequestsQuery>,
) -> Result<Json<Value>, ApiError> {
    authz::require(&scope, &authz::READ_REQUESTS)?;
    let items = services.repo(&scope)?.reward_requests(query.status).await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<CreateRewardRequest>,
) -> Result<(StatusCode, Json<RewardRequest>), ApiError> {
    let request = services
        .engine()
        .request_reward(&scope, &body.student_id, &body.reward_id)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn approve(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<RewardRequestId>,
) -> Result<Json<Approval>, ApiError> {
    Ok(Json(services.engine().approve(&scope, &id).await?))
}

pub async fn reject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<RewardRequestId>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<RewardRequest>, ApiError> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(services.engine().reject(&scope, &id, reason).await?))
}
