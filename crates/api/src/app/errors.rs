//! Every failure leaves the API as a flat `{"error": "<message>"}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use ainventory_auth::AuthzError;
use ainventory_core::DomainError;
use ainventory_infra::{AuthError, StoreError};

/// Handlers return their success body or an already-rendered error.
pub type ApiResult<T = Response> = Result<T, Response>;

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}

pub fn internal_error() -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let status = match &err {
        DomainError::Validation(_)
        | DomainError::InvariantViolation(_)
        | DomainError::InvalidId(_)
        | DomainError::Conflict(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
    };
    json_error(status, err.to_string())
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Database(_) | StoreError::Unavailable(_) => {
            tracing::error!(error = %err, "store failure");
            internal_error()
        }
    }
}

/// Sign-up/sign-in failures are client errors; token failures are 401.
pub fn auth_error_to_response(err: AuthError) -> Response {
    match err {
        AuthError::InvalidCredentials | AuthError::NotAllowed => {
            json_error(StatusCode::BAD_REQUEST, err.to_string())
        }
        AuthError::Token(e) => json_error(StatusCode::UNAUTHORIZED, e.to_string()),
        AuthError::Store(e) => store_error_to_response(e),
        AuthError::Hash(e) => {
            tracing::error!(error = %e, "password hashing failed");
            internal_error()
        }
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, err.to_string())
}
