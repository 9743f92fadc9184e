use uuid::Uuid;

use ainventory_core::{DepartmentId, RoleId, UserId};

use crate::claims::JwtClaims;
use crate::user::User;

/// The authenticated caller of a request.
///
/// Built by the auth middleware from verified claims and the freshly loaded
/// user row, then handed to handlers as an explicit parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub role_id: Option<RoleId>,
    pub department_id: Option<DepartmentId>,
    pub is_superuser: bool,
    /// `jti` of the token the request was authenticated with.
    pub token_id: Uuid,
    pub token_version: i32,
}

impl Principal {
    pub fn from_user(user: &User, claims: &JwtClaims) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role_id: user.role_id,
            department_id: user.department_id,
            is_superuser: user.is_superuser,
            token_id: claims.jti,
            token_version: claims.token_version,
        }
    }
}
