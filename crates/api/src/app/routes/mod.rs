use axum::{routing::get, Router};

pub mod common;
pub mod dashboard;
pub mod invoices;
pub mod payments;
pub mod push;
pub mod system;

/// Router for every endpoint that requires a verified caller.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/invoices", invoices::router().merge(payments::router()))
        .merge(dashboard::router())
}
