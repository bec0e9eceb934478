use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route("/", post(report_observation))
}

/// Record a stock reading and evaluate it in the background.
pub async fn report_observation(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ObservationRequest>,
) -> axum::response::Response {
    if let Err(message) = body.validate() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", message);
    }
    let observation = body.into_observation();
    if let Err(e) = services.store.apply_observation(&observation) {
        return errors::engine_error_to_response(e.into());
    }

    let (company_id, product_id) = (observation.company_id, observation.product_id);
    // Evaluation runs detached; the caller never waits on a workflow.
    drop(services.engine.report_observation(observation));

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "company_id": company_id,
            "product_id": product_id,
            "accepted": true,
        })),
    )
        .into_response()
}
