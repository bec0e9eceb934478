use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::{errors, services::AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn engine_status(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.engine.engine_status().await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
