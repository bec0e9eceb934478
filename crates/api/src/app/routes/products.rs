use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use replenish_core::{CompanyId, ProductId};

use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route("/:company_id/products/:product_id/check", post(check_product))
}

/// Manual trigger: evaluate one product now.
pub async fn check_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path((company_id, product_id)): Path<(String, String)>,
) -> axum::response::Response {
    let company_id = match errors::parse_id::<CompanyId>(&company_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let product_id = match errors::parse_id::<ProductId>(&product_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.engine.check_product(company_id, product_id).await {
        Ok(Some(breach)) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "breach": true,
                "priority": breach.priority,
                "available_quantity": breach.available_quantity,
                "threshold": breach.threshold,
            })),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::OK,
            Json(serde_json::json!({ "breach": false })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
