//! HTTP application wiring (Axum router + shared services).
//!
//! - `services.rs`: repositories, token signer and mailer behind one `Arc`
//! - `routes/`: HTTP routes + handlers (one file per resource, plus the
//!   generic CRUD handlers in `resource.rs`)
//! - `dto.rs`: request bodies and response envelopes
//! - `errors.rs`: the error type every handler returns and its rendering

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, middleware::from_fn, routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let body_limit = services.config.body_limit_bytes;
    let production = services.config.environment.is_production();

    let mut app = Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router(Arc::clone(&services)))
        .fallback(errors::route_not_found);

    if !production {
        app = app.layer(from_fn(errors::expose_error_detail));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(Extension(services))
            .layer(DefaultBodyLimit::max(body_limit)),
    )
}
