use std::collections::HashMap;
use std::str::FromStr;

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ainventory_auth::{User, UserStatus};
use ainventory_core::{DomainError, OrganizationId, PageRequest, RoleId};
use ainventory_org::Organization;
use ainventory_sales::OrderStatus;

use crate::app::errors::{self, ApiResult};

// -------------------------
// Extraction helpers
// -------------------------

/// `Json<T>` whose rejection is the API's flat 400 body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "rejected request body");
                Err(errors::json_error(StatusCode::BAD_REQUEST, "Invalid input"))
            }
        }
    }
}

pub fn parse_id<I>(raw: &str) -> ApiResult<I>
where
    I: FromStr<Err = DomainError>,
{
    raw.parse().map_err(errors::domain_error_to_response)
}

/// `page` / `pageSize` from the query string; bad values fall back to defaults.
pub fn page_request(query: &HashMap<String, String>) -> PageRequest {
    PageRequest::from_query(
        query.get("page").map(String::as_str),
        query.get("pageSize").map(String::as_str),
    )
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub permission: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: Option<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
    #[serde(default)]
    pub notes: String,
}

impl ChangeStatusRequest {
    pub fn status(&self) -> ApiResult<OrderStatus> {
        OrderStatus::parse(&self.status).map_err(errors::domain_error_to_response)
    }
}

#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub status: String,
}

impl UserStatusRequest {
    pub fn status(&self) -> ApiResult<UserStatus> {
        UserStatus::parse(&self.status).map_err(errors::domain_error_to_response)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub is_success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrganizationSummary {
    pub id: OrganizationId,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub organizations: Vec<OrganizationSummary>,
}

impl ProfileResponse {
    pub fn new(user: User, organizations: Vec<Organization>) -> Self {
        Self {
            employee_id: user.employee_id.unwrap_or_default(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            organizations: organizations
                .into_iter()
                .map(|org| OrganizationSummary {
                    id: org.id,
                    name: org.name,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OnboardResponse {
    pub organization_id: OrganizationId,
    pub organization: String,
}

#[derive(Debug, Serialize)]
pub struct AncestryResponse {
    pub is_ancestor: bool,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub token_version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ainventory_products::CategoryId;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id::<CategoryId>("42").unwrap(), CategoryId::new(42));
        assert_eq!(
            parse_id::<CategoryId>("0").unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            parse_id::<CategoryId>("abc").unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn page_size_is_read_from_camel_case_key() {
        let query = HashMap::from([
            ("page".to_string(), "2".to_string()),
            ("pageSize".to_string(), "25".to_string()),
        ]);
        let page = page_request(&query);
        assert_eq!((page.page(), page.page_size()), (2, 25));
    }
}
