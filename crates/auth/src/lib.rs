//! `ainventory-auth`: identity, permissions and authorization decisions.
//!
//! This crate is decoupled from HTTP and storage: stores gather
//! [`PermissionFacts`], this crate decides.

pub mod authorize;
pub mod claims;
pub mod overrides;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod revocation;
pub mod roles;
pub mod token;
pub mod user;

pub use authorize::{
    AuthorizationExplanation, AuthzError, Decision, DenialKind, GrantSource, OverrideFact,
    PermissionFacts, authorize, evaluate, explain,
};
pub use claims::{JwtClaims, TokenType, TokenValidationError, validate_claims};
pub use overrides::{DepartmentGrantRequest, DepartmentPermission, OverrideRequest, UserPermission};
pub use password::{PasswordHashError, hash_password, verify_password};
pub use permissions::{NewPermission, Permission, PermissionName, default_permissions, group_by_module};
pub use principal::Principal;
pub use revocation::{BlacklistedToken, RevocationPolicy, check_revocation};
pub use roles::{
    DefaultRole, NewRole, Role, RoleChange, RoleHistoryAction, RoleHistoryEntry, RolePermission,
    RoleUpdate, default_roles,
};
pub use token::{IssuedToken, TokenError, TokenIssuer};
pub use user::{Gender, NewUser, SignIn, SignUp, User, UserStatus, ValidSignUp, normalize_email};
