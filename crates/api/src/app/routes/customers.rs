use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use ainventory_sales::{CustomerId, NewCustomer};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::middleware::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/customers/", get(list_customers).post(create_customer))
        .route("/customers/:id/", get(get_customer))
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    authz::require(&services, &principal, "customers.view").await?;
    let page = services
        .store
        .list_customers(dto::page_request(&query))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(page).into_response())
}

pub async fn create_customer(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    ApiJson(body): ApiJson<NewCustomer>,
) -> ApiResult {
    authz::require(&services, &principal, "customers.create").await?;
    let customer = services
        .store
        .create_customer(body, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(customer)).into_response())
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "customers.view").await?;
    let id: CustomerId = dto::parse_id(&id)?;
    let customer = services
        .store
        .get_customer(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(customer).into_response())
}
