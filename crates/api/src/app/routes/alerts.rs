use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use replenish_core::AlertId;

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_alerts))
        .route("/:id", get(get_alert))
        .route("/:id/approve", post(approve_alert))
        .route("/:id/ignore", post(ignore_alert))
}

pub async fn list_alerts(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::AlertQuery>,
) -> axum::response::Response {
    let (filter, pagination) = query.into_parts();
    match services.engine.list_alerts(filter, pagination).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_alert(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let alert_id = match errors::parse_id::<AlertId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let alert = match services.engine.get_alert(alert_id).await {
        Ok(a) => a,
        Err(e) => return errors::engine_error_to_response(e),
    };
    let execution = match services.engine.execution_for_alert(alert_id).await {
        Ok(x) => x,
        Err(e) => return errors::engine_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "alert": alert,
            "execution_id": execution.map(|x| x.id),
        })),
    )
        .into_response()
}

pub async fn approve_alert(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let alert_id = match errors::parse_id::<AlertId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.engine.approve(alert_id).await {
        Ok(alert) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "alert_id": alert.id,
                "workflow": "dispatched",
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn ignore_alert(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let alert_id = match errors::parse_id::<AlertId>(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.engine.ignore(alert_id).await {
        Ok(alert) => (StatusCode::OK, Json(alert)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
