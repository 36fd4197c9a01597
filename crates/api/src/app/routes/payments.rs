use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};

use posledger_core::InvoiceId;
use posledger_invoicing::PaymentRequest;

use crate::app::errors;
use crate::app::routes::common::{json_body, parse_id};
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new().route("/:id/payments", get(list_payments).post(add_payment))
}

/// POST /invoices/:id/payments
///
/// Answers with the payment and the invoice as committed with it.
pub async fn add_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Response {
    let id: InvoiceId = match parse_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = match json_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services.engine.add_payment(ctx.caller(), id, request).await {
        Ok(receipt) => errors::ok(StatusCode::CREATED, receipt),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> Response {
    let id: InvoiceId = match parse_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.list_payments(ctx.caller(), id).await {
        Ok(payments) => errors::ok(StatusCode::OK, payments),
        Err(e) => errors::engine_error_to_response(e),
    }
}
