use std::sync::Arc;

use axum::Router;

use crate::app::services::AppServices;

pub mod auth;
pub mod resource;
pub mod reviews;
pub mod system;
pub mod tours;
pub mod users;

/// Router for every `/api/v1` resource.
pub fn router(services: Arc<AppServices>) -> Router {
    Router::new()
        .nest("/api/v1/tours", tours::router(Arc::clone(&services)))
        .nest("/api/v1/users", users::router(Arc::clone(&services)))
        .nest("/api/v1/reviews", reviews::router(services))
}
