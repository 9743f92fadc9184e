use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use ainventory_products::{CategoryId, CategoryInput};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/categories/", get(list_categories).post(create_category))
        .route(
            "/categories/:id/",
            get(get_category).patch(update_category).delete(delete_category),
        )
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    let page = services
        .store
        .list_categories(dto::page_request(&query))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(page).into_response())
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<CategoryInput>,
) -> ApiResult {
    let category = services
        .store
        .create_category(body)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(category)).into_response())
}

pub async fn get_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: CategoryId = dto::parse_id(&id)?;
    let category = services
        .store
        .get_category(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(category).into_response())
}

pub async fn update_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CategoryInput>,
) -> ApiResult {
    let id: CategoryId = dto::parse_id(&id)?;
    let category = services
        .store
        .update_category(id, body)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(category).into_response())
}

pub async fn delete_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: CategoryId = dto::parse_id(&id)?;
    services
        .store
        .delete_category(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(dto::MessageResponse::new("category deleted")).into_response())
}
