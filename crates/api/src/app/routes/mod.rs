use axum::{
    routing::{get, post},
    Router,
};

pub mod admin;
pub mod catalog;
pub mod ledger;
pub mod requests;
pub mod schools;
pub mod students;
pub mod system;
pub mod transactions;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/impersonation", post(system::start_impersonation))
        .route("/stats", get(system::tenant_stats))
        .nest("/students", students::router())
        .merge(catalog::router())
        .nest("/transactions", transactions::router())
        .nest("/ledger", ledger::router())
        .nest("/reward-requests", requests::router())
        .nest("/admin", admin::router())
        .nest("/schools", schools::router())
}
