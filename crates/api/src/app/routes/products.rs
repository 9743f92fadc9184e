use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use ainventory_products::{NewInventoryTransaction, NewProduct, ProductId};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::middleware::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/products/", get(list_products).post(create_product))
        .route("/products/:id/", get(get_product))
        .route(
            "/products/:id/inventory/",
            get(list_inventory).post(record_inventory),
        )
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    authz::require(&services, &principal, "products.view").await?;
    let page = services
        .store
        .list_products(dto::page_request(&query))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(page).into_response())
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    ApiJson(body): ApiJson<NewProduct>,
) -> ApiResult {
    authz::require(&services, &principal, "products.create").await?;
    let product = services
        .store
        .create_product(body, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(product)).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "products.view").await?;
    let id: ProductId = dto::parse_id(&id)?;
    let product = services
        .store
        .get_product(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(product).into_response())
}

pub async fn record_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NewInventoryTransaction>,
) -> ApiResult {
    authz::require(&services, &principal, "products.manage_inventory").await?;
    let id: ProductId = dto::parse_id(&id)?;
    let (product, transaction) = services
        .store
        .record_inventory(id, body, principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "product": product, "transaction": transaction })),
    )
        .into_response())
}

pub async fn list_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "products.manage_inventory").await?;
    let id: ProductId = dto::parse_id(&id)?;
    let transactions = services
        .store
        .inventory_transactions(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(transactions).into_response())
}
