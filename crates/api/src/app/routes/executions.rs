use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use replenish_core::ExecutionId;

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_executions))
        .route("/:id", get(get_execution))
}

pub async fn list_executions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ExecutionQuery>,
) -> axum::response::Response {
    let (filter, pagination) = query.into_parts();
    match services.engine.list_executions(filter, pagination).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_execution(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let execution_id = match errors::parse_id::<ExecutionId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.engine.get_execution(execution_id).await {
        Ok(execution) => (StatusCode::OK, Json(execution)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
