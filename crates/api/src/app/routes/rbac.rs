use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
};

use ainventory_auth::{
    DepartmentGrantRequest, NewPermission, NewRole, OverrideRequest, PermissionName, RoleUpdate,
    group_by_module,
};
use ainventory_core::{DepartmentId, RoleId, UserId};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult, json_error};
use crate::app::services::AppServices;
use crate::authz;
use crate::middleware::CurrentUser;

const MANAGE: &str = "roles.manage";

pub fn router() -> Router {
    Router::new()
        .route("/rbac/check", get(check))
        .route("/rbac/permissions/", get(list_permissions).post(create_permission))
        .route("/rbac/roles/", get(list_roles).post(create_role))
        .route("/rbac/roles/:id/", get(get_role).patch(update_role).delete(delete_role))
        .route(
            "/rbac/roles/:id/permissions/",
            get(role_permissions).post(grant_permission),
        )
        .route("/rbac/roles/:id/permissions/:name/", delete(revoke_permission))
        .route("/rbac/roles/:id/history/", get(role_history))
        .route("/rbac/users/:id/role/", put(assign_role))
        .route("/rbac/users/:id/overrides/", get(user_overrides).put(upsert_override))
        .route(
            "/rbac/departments/:id/grants/",
            get(department_grants).put(upsert_department_grant),
        )
}

/// Explain whether the caller holds `?permission=`.
pub async fn check(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    let Some(permission) = query
        .get("permission")
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
    else {
        return Err(json_error(StatusCode::BAD_REQUEST, "permission is required"));
    };
    let explanation = services
        .permissions
        .explain(principal.user_id, &PermissionName::new(permission))
        .await;
    Ok(Json(explanation).into_response())
}

pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let permissions = services
        .store
        .list_permissions()
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(permissions).into_response())
}

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    ApiJson(body): ApiJson<NewPermission>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let permission = services
        .store
        .create_permission(body)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(permission)).into_response())
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let roles = services
        .store
        .list_roles()
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(roles).into_response())
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    ApiJson(body): ApiJson<NewRole>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let role = services
        .store
        .create_role(body, false, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok((StatusCode::CREATED, Json(role)).into_response())
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: RoleId = dto::parse_id(&id)?;
    let role = services
        .store
        .get_role(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(role).into_response())
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RoleUpdate>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: RoleId = dto::parse_id(&id)?;
    let role = services
        .store
        .update_role(id, body, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(role).into_response())
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: RoleId = dto::parse_id(&id)?;
    services
        .store
        .delete_role(id, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(dto::MessageResponse::new("role deleted")).into_response())
}

/// Active permissions of the role, grouped by module.
pub async fn role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: RoleId = dto::parse_id(&id)?;
    let permissions = services
        .store
        .role_permissions(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(group_by_module(permissions)).into_response())
}

pub async fn grant_permission(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::GrantPermissionRequest>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: RoleId = dto::parse_id(&id)?;
    services
        .store
        .grant_role_permission(id, &body.permission, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(dto::MessageResponse::new("permission granted")).into_response())
}

pub async fn revoke_permission(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: RoleId = dto::parse_id(&id)?;
    services
        .store
        .revoke_role_permission(id, &name, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(dto::MessageResponse::new("permission revoked")).into_response())
}

pub async fn role_history(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: RoleId = dto::parse_id(&id)?;
    let history = services
        .store
        .role_history(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(history).into_response())
}

pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::AssignRoleRequest>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: UserId = dto::parse_id(&id)?;
    let user = services
        .store
        .assign_role(id, body.role_id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(user).into_response())
}

pub async fn user_overrides(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: UserId = dto::parse_id(&id)?;
    let overrides = services
        .store
        .user_overrides(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(overrides).into_response())
}

pub async fn upsert_override(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<OverrideRequest>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: UserId = dto::parse_id(&id)?;
    let row = services
        .store
        .upsert_user_override(id, body, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(row).into_response())
}

pub async fn department_grants(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    let grants = services
        .store
        .department_grants(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(grants).into_response())
}

pub async fn upsert_department_grant(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<DepartmentGrantRequest>,
) -> ApiResult {
    authz::require(&services, &principal, MANAGE).await?;
    let id: DepartmentId = dto::parse_id(&id)?;
    let row = services
        .store
        .upsert_department_grant(id, body, Some(principal.user_id))
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(Json(row).into_response())
}
