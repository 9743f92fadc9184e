//! Permission guard for handlers.
//!
//! Handlers call [`require`] before touching the store; the decision comes
//! from the evaluator, which fails closed.

use ainventory_auth::{PermissionName, Principal};

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;

pub async fn require(
    services: &AppServices,
    principal: &Principal,
    permission: &'static str,
) -> ApiResult<()> {
    services
        .permissions
        .require(principal.user_id, &PermissionName::new(permission))
        .await
        .map_err(|e| {
            tracing::debug!(user_id = %principal.user_id, permission, "permission denied");
            errors::authz_error_to_response(e)
        })
}
