use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, patch},
    Json, Router,
};
use serde_json::{json, Value};

use schoolbank_auth::{EffectiveScope, Permission};
use schoolbank_core::TransactionId;
use schoolbank_infra::Reversal;
use schoolbank_ledger::{Transaction, TransactionUpdate};

use crate::app::dto::TransactionsQuery;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transactions))
        .route("/:id", patch(update_transaction).delete(delete_transaction))
}

/// GET /transactions - newest first, one optional filter.
pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Value>, ApiError> {
    authz::require(&scope, &[Permission::VIEW_TRANSACTIONS])?;
    let items = services
        .repo(&scope)?
        .transactions(&query.filter(), query.limit)
        .await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn update_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<TransactionId>,
    Json(body): Json<TransactionUpdate>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(services.engine().update_transaction(&scope, &id, body).await?))
}

pub async fn delete_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<TransactionId>,
) -> Result<Json<Reversal>, ApiError> {
    Ok(Json(services.engine().delete_transaction(&scope, &id).await?))
}
