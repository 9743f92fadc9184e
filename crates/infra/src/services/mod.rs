//! Application services shared by every transport.

mod auth;
mod permissions;

pub use auth::{AuthError, AuthService, SignedIn};
pub use permissions::PermissionEvaluator;
