use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};

use posledger_core::{InvoiceId, InvoiceItemId};
use posledger_infra::{CreateInvoice, InvoiceQuery};

use crate::app::routes::common::{json_body, parse_id, query};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route(
            "/:id",
            get(get_invoice).patch(patch_invoice).delete(delete_invoice),
        )
        .route("/:id/items", post(add_items))
        .route("/:id/items/:item_id", delete(remove_item))
        .route("/:id/cancel", post(cancel_invoice))
}

/// POST /invoices
pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    body: Result<Json<CreateInvoice>, JsonRejection>,
) -> Response {
    let cmd = match json_body(body) {
        Ok(cmd) => cmd,
        Err(resp) => return resp,
    };
    match services.engine.create_invoice(ctx.caller(), cmd).await {
        Ok(detail) => errors::ok(StatusCode::CREATED, detail),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// GET /invoices?status=&date_from=&date_to=&limit=
pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    params: Result<Query<InvoiceQuery>, QueryRejection>,
) -> Response {
    let params = match query(params) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match services.engine.list_invoices(ctx.caller(), &params).await {
        Ok(invoices) => errors::ok(StatusCode::OK, invoices),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> Response {
    let id: InvoiceId = match parse_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.get_invoice(ctx.caller(), id).await {
        Ok(detail) => errors::ok(StatusCode::OK, detail),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// PATCH /invoices/:id with a partial object of writable fields.
pub async fn patch_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Response {
    let id: InvoiceId = match parse_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let fields = match json_body(body) {
        Ok(fields) => fields,
        Err(resp) => return resp,
    };
    match services.engine.patch_invoice(ctx.caller(), id, &fields).await {
        Ok(invoice) => errors::ok(StatusCode::OK, invoice),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> Response {
    let id: InvoiceId = match parse_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.delete_invoice(ctx.caller(), id).await {
        Ok(()) => errors::ok(StatusCode::OK, json!({ "id": id })),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn add_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::AddItemsRequest>, JsonRejection>,
) -> Response {
    let id: InvoiceId = match parse_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = match json_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services.engine.add_items(ctx.caller(), id, request.items).await {
        Ok(detail) => errors::ok(StatusCode::CREATED, detail),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path((id, item_id)): Path<(String, String)>,
) -> Response {
    let id: InvoiceId = match parse_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id: InvoiceItemId = match parse_id(&item_id, "item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.remove_item(ctx.caller(), id, item_id).await {
        Ok(invoice) => errors::ok(StatusCode::OK, invoice),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cancel_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> Response {
    let id: InvoiceId = match parse_id(&id, "invoice id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.cancel_invoice(ctx.caller(), id).await {
        Ok(invoice) => errors::ok(StatusCode::OK, invoice),
        Err(e) => errors::engine_error_to_response(e),
    }
}
