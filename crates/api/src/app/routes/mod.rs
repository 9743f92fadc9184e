use axum::Router;

pub mod auth;
pub mod categories;
pub mod customers;
pub mod departments;
pub mod orders;
pub mod products;
pub mod rbac;
pub mod suppliers;
pub mod system;
pub mod user;

/// Routes under `/api/v1` that require a bearer token.
pub fn router() -> Router {
    Router::new()
        .merge(auth::router())
        .merge(user::router())
        .nest(
            "/product",
            Router::new()
                .merge(categories::router())
                .merge(suppliers::router())
                .merge(products::router()),
        )
        .merge(departments::router())
        .merge(rbac::router())
        .nest(
            "/sales",
            Router::new()
                .merge(customers::router())
                .merge(orders::router()),
        )
}
