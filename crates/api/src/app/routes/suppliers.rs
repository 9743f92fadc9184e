use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use ainventory_core::SortDirection;
use ainventory_products::{NewSupplier, SupplierId, SupplierSort};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::middleware::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/suppliers/", get(list_suppliers).post(create_supplier))
        .route("/suppliers/:id/", get(get_supplier))
}

/// `sortBy` must be whitelisted; `sortDir` is `asc` or anything-else-means-desc.
pub async fn list_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    let sort = SupplierSort::parse(query.get("sortBy").map(String::as_str))
        .map_err(errors::domain_error_to_response)?;
    let direction = SortDirection::parse(query.get("sortDir").map(String::as_str));

    let page = services
        .store
        .list_suppliers(dto::page_request(&query), sort, direction)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(page).into_response())
}

pub async fn create_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    ApiJson(body): ApiJson<NewSupplier>,
) -> ApiResult {
    let supplier = services
        .store
        .create_supplier(body, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(supplier)).into_response())
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: SupplierId = dto::parse_id(&id)?;
    let supplier = services
        .store
        .get_supplier(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(supplier).into_response())
}
