//! HTTP application wiring.
//!
//! - `services.rs`: store, engine, hub and token verification
//! - `routes/`: handlers, one file per area (ledger writes, push feed, dashboard)
//! - `dto.rs`: request shapes not owned by the engine
//! - `errors.rs`: the `{"success": …}` envelope and error mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices};

/// Build the full HTTP router around `services`.
pub fn build_app(services: AppServices) -> Router {
    let auth_state = middleware::AuthState {
        jwt: Arc::clone(&services.jwt),
    };
    let services = Arc::new(services);

    // Ledger routes and the dashboard stream need a verified caller.
    let protected = routes::router()
        .layer(Extension(Arc::clone(&services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state.clone(),
            middleware::auth_middleware,
        ));

    // Push feeds accept anonymous sockets and authenticate inside the handler.
    let feeds = routes::push::router()
        .layer(Extension(Arc::clone(&services)))
        .layer(Extension(auth_state));

    Router::new()
        .route("/health", get(routes::system::health))
        .layer(Extension(services))
        .merge(feeds)
        .merge(protected)
        .layer(ServiceBuilder::new())
}
