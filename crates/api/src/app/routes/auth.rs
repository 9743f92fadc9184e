use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};

use ainventory_auth::{SignIn, SignUp};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::middleware::{CurrentToken, CurrentUser};

/// Routes reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/signup/", post(sign_up))
        .route("/auth/signin/", post(sign_in))
}

pub fn router() -> Router {
    Router::new()
        .route("/auth/logout/", post(logout))
        .route("/auth/logout-all/", post(logout_all))
}

pub async fn sign_up(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<SignUp>,
) -> ApiResult {
    services
        .auth
        .sign_up(body)
        .await
        .map_err(errors::auth_error_to_response)?;

    Ok((
        StatusCode::CREATED,
        Json(dto::SignUpResponse {
            is_success: true,
            message: "User created successfully".to_string(),
        }),
    )
        .into_response())
}

pub async fn sign_in(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<SignIn>,
) -> ApiResult {
    let signed_in = services
        .auth
        .sign_in(body)
        .await
        .map_err(errors::auth_error_to_response)?;

    Ok(Json(dto::SignInResponse {
        token: signed_in.token.token,
    })
    .into_response())
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentToken(claims): CurrentToken,
) -> ApiResult {
    services
        .auth
        .logout(&claims)
        .await
        .map_err(errors::auth_error_to_response)?;
    Ok(Json(dto::MessageResponse::new("logged out")).into_response())
}

pub async fn logout_all(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(principal): CurrentUser,
) -> Response {
    match services.auth.logout_all(principal.user_id).await {
        Ok(token_version) => Json(dto::LogoutAllResponse { token_version }).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
