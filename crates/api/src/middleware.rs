use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{HeaderMap, StatusCode, request::Parts},
    middleware::Next,
    response::Response,
};

use ainventory_auth::{JwtClaims, Principal};
use ainventory_infra::AuthError;

use crate::app::errors::{self, json_error};
use crate::app::services::AppServices;

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AppServices>,
}

/// Verify the bearer token and attach the caller's [`Principal`] and
/// [`JwtClaims`] to the request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "authorization header required"))?;

    let (user, claims) = state
        .services
        .auth
        .authenticate(token)
        .await
        .map_err(reject)?;

    req.extensions_mut().insert(Principal::from_user(&user, &claims));
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

fn reject(err: AuthError) -> Response {
    match err {
        AuthError::Store(e) if !matches!(e, ainventory_infra::StoreError::Domain(_)) => {
            errors::store_error_to_response(e)
        }
        AuthError::NotAllowed => json_error(StatusCode::UNAUTHORIZED, "account is not active"),
        other => {
            tracing::debug!(error = %other, "bearer token rejected");
            json_error(StatusCode::UNAUTHORIZED, "invalid or expired token")
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// The authenticated caller, as placed by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Self)
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "authentication required"))
    }
}

/// Claims of the token the request was authenticated with.
#[derive(Debug, Clone)]
pub struct CurrentToken(pub JwtClaims);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentToken
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<JwtClaims>()
            .cloned()
            .map(Self)
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
        assert_eq!(extract_bearer(&headers("Basic abc")), None);
        assert_eq!(extract_bearer(&headers("Bearer   ")), None);
        assert_eq!(extract_bearer(&headers("bearer abc")), None);
    }
}
