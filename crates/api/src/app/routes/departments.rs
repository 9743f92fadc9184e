use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};

use ainventory_core::{DepartmentId, UserId};
use ainventory_org::NewDepartment;

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::middleware::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/departments/", get(list_departments).post(create_department))
        .route("/departments/:id/", get(get_department).delete(delete_department))
        .route("/departments/:id/children/", get(children))
        .route("/departments/:id/ancestors/", get(ancestors))
        .route("/departments/:id/descendants/", get(descendants))
        .route("/departments/:id/closure/", get(closure_rows))
        .route("/departments/:id/is-ancestor-of/:other/", get(is_ancestor_of))
        .route("/departments/:id/users/:user_id/", put(assign_user))
}

pub async fn list_departments(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult {
    authz::require(&services, &principal, "users.view").await?;
    let departments = services
        .store
        .list_departments()
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(departments).into_response())
}

pub async fn create_department(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    ApiJson(body): ApiJson<NewDepartment>,
) -> ApiResult {
    authz::require(&services, &principal, "users.edit").await?;
    let department = services
        .store
        .create_department(body, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(department)).into_response())
}

pub async fn get_department(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "users.view").await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    let department = services
        .store
        .get_department(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(department).into_response())
}

pub async fn delete_department(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "users.edit").await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    services
        .store
        .delete_department(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(dto::MessageResponse::new("department deleted")).into_response())
}

pub async fn children(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "users.view").await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    let departments = services
        .store
        .child_departments(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(departments).into_response())
}

pub async fn ancestors(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "users.view").await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    let departments = services
        .store
        .ancestors(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(departments).into_response())
}

pub async fn descendants(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "users.view").await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    let departments = services
        .store
        .descendants(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(departments).into_response())
}

pub async fn closure_rows(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "users.view").await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    let edges = services
        .store
        .closure_rows_for(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(edges).into_response())
}

pub async fn is_ancestor_of(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path((id, other)): Path<(String, String)>,
) -> ApiResult {
    authz::require(&services, &principal, "users.view").await?;
    let ancestor: DepartmentId = dto::parse_id(&id)?;
    let descendant: DepartmentId = dto::parse_id(&other)?;
    let is_ancestor = services
        .store
        .is_ancestor_of(ancestor, descendant)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(dto::AncestryResponse { is_ancestor }).into_response())
}

pub async fn assign_user(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path((id, user_id)): Path<(String, String)>,
) -> ApiResult {
    authz::require(&services, &principal, "users.edit").await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    let user_id: UserId = dto::parse_id(&user_id)?;
    let user = services
        .store
        .assign_user_department(user_id, Some(id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(user).into_response())
}
