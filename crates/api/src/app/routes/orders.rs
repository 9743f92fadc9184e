use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};

use ainventory_sales::{
    CustomerId, NewOrder, NewOrderItem, NewPayment, OrderId, OrderItemId, OrderItemUpdate,
};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::middleware::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/orders/", get(list_orders).post(create_order))
        .route("/orders/:id/", get(get_order))
        .route("/orders/:id/status/", patch(change_status))
        .route("/orders/:id/items/", post(add_item))
        .route("/orders/:id/items/:item_id/", patch(update_item).delete(remove_item))
        .route("/orders/:id/payments/", post(add_payment))
        .route("/orders/:id/history/", get(history))
}

/// Newest first; `?customer_id=` narrows to one customer.
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.view").await?;
    let customer_id = query
        .get("customer_id")
        .map(|raw| dto::parse_id::<CustomerId>(raw))
        .transpose()?;
    let page = services
        .store
        .list_orders(dto::page_request(&query), customer_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(page).into_response())
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    ApiJson(body): ApiJson<NewOrder>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.create").await?;
    let order = services
        .store
        .create_order(body, principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.view").await?;
    let id: OrderId = dto::parse_id(&id)?;
    let order = services
        .store
        .get_order(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(order).into_response())
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::ChangeStatusRequest>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.process").await?;
    let id: OrderId = dto::parse_id(&id)?;
    let status = body.status()?;
    let order = services
        .store
        .change_order_status(id, status, body.notes, principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(order).into_response())
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NewOrderItem>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.edit").await?;
    let id: OrderId = dto::parse_id(&id)?;
    let order = services
        .store
        .add_order_item(id, body, principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path((id, item_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<OrderItemUpdate>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.edit").await?;
    let id: OrderId = dto::parse_id(&id)?;
    let item_id: OrderItemId = dto::parse_id(&item_id)?;
    let order = services
        .store
        .update_order_item(id, item_id, body, principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(order).into_response())
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.edit").await?;
    let id: OrderId = dto::parse_id(&id)?;
    let item_id: OrderItemId = dto::parse_id(&item_id)?;
    let order = services
        .store
        .remove_order_item(id, item_id, principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(order).into_response())
}

pub async fn add_payment(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NewPayment>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.edit").await?;
    let id: OrderId = dto::parse_id(&id)?;
    let order = services
        .store
        .add_payment(id, body, principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

pub async fn history(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "orders.view").await?;
    let id: OrderId = dto::parse_id(&id)?;
    let entries = services
        .store
        .order_history(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(entries).into_response())
}
