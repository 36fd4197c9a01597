use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};
use serde_json::json;

use posledger_auth::explain_access;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::ok(
        StatusCode::OK,
        json!({
            "status": if services.hub.is_shut_down() { "shutting_down" } else { "ok" },
            "hub": services.hub.stats(),
        }),
    )
}

/// What the presented token lets its bearer do, operation by operation.
pub async fn whoami(Extension(ctx): Extension<CallerContext>) -> Response {
    let caller = ctx.caller();
    errors::ok(
        StatusCode::OK,
        json!({
            "user_id": caller.user_id,
            "access": explain_access(caller),
        }),
    )
}
