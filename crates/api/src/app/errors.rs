use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use posledger_infra::EngineError;

/// HTTP status for an engine failure.
pub fn status_of(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Authorization(_) => StatusCode::FORBIDDEN,
        EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
        EngineError::StateConflict(_) => StatusCode::CONFLICT,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Conflict(_) | EngineError::TransientStore(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub fn engine_error_to_response(err: EngineError) -> Response {
    let status = status_of(&err);
    if status.is_server_error() {
        tracing::warn!(error = %err, "ledger operation failed");
    }
    let body = match &err {
        EngineError::Validation { field, message } => json!({
            "success": false,
            "error": err.code(),
            "message": message,
            "field": field,
        }),
        _ => json!({
            "success": false,
            "error": err.code(),
            "message": err.to_string(),
        }),
    };
    (status, Json(body)).into_response()
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// `{"success": true, "data": …}`
pub fn ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}
