use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, routing::post, Json, Router};

use schoolbank_auth::EffectiveScope;
use schoolbank_infra::{ClassAwardReport, GiveResult};

use crate::app::dto::{GiveClassRequest, GiveRequest};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/give", post(give))
        .route("/give-class", post(give_class))
}

/// POST /ledger/give - award or deduct points for one student.
pub async fn give(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<GiveRequest>,
) -> Result<(StatusCode, Json<GiveResult>), ApiError> {
    let award = body.award.into_award()?;
    let result = services.engine().give(&scope, &body.student_id, award).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /ledger/give-class - per-student results; a partial run is still 200.
pub async fn give_class(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<GiveClassRequest>,
) -> Result<Json<ClassAwardReport>, ApiError> {
    let award = body.award.into_award()?;
    Ok(Json(services.engine().give_to_class(&scope, &body.class_id, award).await?))
}
