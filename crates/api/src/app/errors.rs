use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use replenish_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::UnknownProduct { .. } => {
            json_error(StatusCode::NOT_FOUND, "unknown_product", err.to_string())
        }
        EngineError::AlertNotFound(_) | EngineError::ExecutionNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        EngineError::ActiveAlertExists { .. } | EngineError::DuplicateAlert { .. } => {
            json_error(StatusCode::CONFLICT, "active_alert_exists", err.to_string())
        }
        EngineError::ExecutionAlreadyExists { .. } => {
            json_error(StatusCode::CONFLICT, "execution_exists", err.to_string())
        }
        EngineError::InvalidTransition(_) => {
            json_error(StatusCode::CONFLICT, "invalid_transition", err.to_string())
        }
        EngineError::Collaborator(_) => {
            json_error(StatusCode::BAD_GATEWAY, "collaborator_error", err.to_string())
        }
        EngineError::Store(e) => {
            tracing::error!(error = %e, "ledger error");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                format!("{e}"),
            )
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path id, answering 400 on garbage.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
