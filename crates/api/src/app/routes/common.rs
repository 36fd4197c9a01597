use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Parse a numeric path id, answering 400 in the usual envelope otherwise.
pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, Response>
where
    T: From<i64>,
{
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .map(T::from)
        .ok_or_else(|| invalid(what, format!("invalid {what} `{raw}`")))
}

pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(value)| value)
        .map_err(|rejection| invalid("body", rejection.body_text()))
}

pub fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| invalid("query", rejection.body_text()))
}

fn invalid(field: &'static str, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "success": false,
            "error": "validation_error",
            "message": message,
            "field": field,
        })),
    )
        .into_response()
}
