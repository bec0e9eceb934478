use axum::{routing::get, Router};

pub mod alerts;
pub mod executions;
pub mod observations;
pub mod products;
pub mod system;

/// Router for all engine endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/engine/status", get(system::engine_status))
        .nest("/alerts", alerts::router())
        .nest("/executions", executions::router())
        .nest("/observations", observations::router())
        .nest("/companies", products::router())
}
