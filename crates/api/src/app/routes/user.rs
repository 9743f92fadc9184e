use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::{get, patch, post},
};

use ainventory_core::UserId;
use ainventory_org::Onboarding;

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::middleware::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/user/me/", get(me))
        .route("/user/onboard/", post(onboard))
        .route("/users/:id/unlock/", post(unlock))
        .route("/users/:id/status/", patch(set_status))
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult {
    let user = services
        .store
        .get_user(principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;
    let organizations = services
        .store
        .organizations_owned_by(principal.user_id)
        .await
        .map_err(errors::store_error_to_response)?;

    Ok(Json(dto::ProfileResponse::new(user, organizations)).into_response())
}

pub async fn onboard(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    ApiJson(body): ApiJson<Onboarding>,
) -> ApiResult {
    let onboarding = body.validate().map_err(errors::domain_error_to_response)?;
    let organization = services
        .store
        .onboard(principal.user_id, onboarding)
        .await
        .map_err(errors::store_error_to_response)?;

    tracing::info!(
        user_id = %principal.user_id,
        organization_id = %organization.id,
        "user onboarded"
    );
    Ok(Json(dto::OnboardResponse {
        organization_id: organization.id,
        organization: organization.name,
    })
    .into_response())
}

/// Clears a lockout left by repeated failed sign-ins.
pub async fn unlock(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&services, &principal, "users.edit").await?;
    let id: UserId = dto::parse_id(&id)?;
    let user = services
        .store
        .unlock_user(id)
        .await
        .map_err(errors::store_error_to_response)?;

    tracing::info!(user_id = %id, by = %principal.user_id, "account unlocked");
    Ok(Json(user).into_response())
}

pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::UserStatusRequest>,
) -> ApiResult {
    authz::require(&services, &principal, "users.edit").await?;
    let id: UserId = dto::parse_id(&id)?;
    let status = body.status()?;
    let user = services
        .store
        .set_user_status(id, status)
        .await
        .map_err(errors::store_error_to_response)?;

    tracing::info!(
        user_id = %id,
        by = %principal.user_id,
        status = status.as_str(),
        "account status changed"
    );
    Ok(Json(user).into_response())
}
