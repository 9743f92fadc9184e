//! Axum router and service wiring.
//!
//! - `services.rs`: storage backend selection and shared services
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request/response bodies and extraction helpers
//! - `errors.rs`: the flat `{"error": ...}` response shape

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use ainventory_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router for the given configuration.
pub async fn build_app(config: AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(&config).await?);
    Ok(build_router(services))
}

pub fn build_router(services: Arc<services::AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        services: services.clone(),
    };

    // Everything except sign-up and sign-in needs a bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let api = routes::auth::public_router().merge(protected);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/ping", get(routes::system::ping))
        .nest("/api/v1", api)
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
