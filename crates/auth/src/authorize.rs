use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::PermissionName;

/// Everything the evaluator needs to know about one (user, permission) pair.
///
/// Gathering these facts is the store's job; deciding is pure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionFacts {
    /// The user's role links an active permission with this name.
    pub role_grant: bool,

    /// The user's override row for this permission, if any.
    pub user_override: Option<OverrideFact>,
}

/// Snapshot of a `UserPermission` row joined with its permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideFact {
    pub is_granted: bool,
    pub permission_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Role,
    UserOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// Neither the role nor an override mentions the permission.
    MissingPermission,
    /// An override exists but revokes the permission.
    OverrideRevoked,
    /// An override grants the permission but has expired.
    OverrideExpired,
    /// An override grants the permission but the permission is inactive.
    PermissionInactive,
    /// The facts could not be loaded; the evaluator fails closed.
    LookupFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted(GrantSource),
    Denied(DenialKind),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }
}

/// Decide a permission check.
///
/// 1. A role grant wins.
/// 2. Otherwise an override grants iff it is granted, its permission is active
///    and it has not expired (`expires_at` absent or strictly after `now`).
/// 3. Otherwise deny.
///
/// Department grants are not an input.
pub fn evaluate(facts: &PermissionFacts, now: DateTime<Utc>) -> Decision {
    if facts.role_grant {
        return Decision::Granted(GrantSource::Role);
    }

    let Some(fact) = facts.user_override else {
        return Decision::Denied(DenialKind::MissingPermission);
    };

    if !fact.is_granted {
        return Decision::Denied(DenialKind::OverrideRevoked);
    }
    if !fact.permission_active {
        return Decision::Denied(DenialKind::PermissionInactive);
    }
    if fact.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Decision::Denied(DenialKind::OverrideExpired);
    }

    Decision::Granted(GrantSource::UserOverride)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Turn a decision into a `Result` for the request boundary.
pub fn authorize(required: &PermissionName, decision: Decision) -> Result<(), AuthzError> {
    if decision.is_granted() {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Explanation of an authorization decision, suitable for an API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub source: Option<GrantSource>,
    pub denial: Option<DenialKind>,
    pub reason: String,
}

pub fn explain(required: &PermissionName, decision: Decision) -> AuthorizationExplanation {
    let name = required.as_str();
    let (source, denial, reason) = match decision {
        Decision::Granted(GrantSource::Role) => (
            Some(GrantSource::Role),
            None,
            format!("the user's role grants '{name}'"),
        ),
        Decision::Granted(GrantSource::UserOverride) => (
            Some(GrantSource::UserOverride),
            None,
            format!("an active user override grants '{name}'"),
        ),
        Decision::Denied(kind) => {
            let reason = match kind {
                DenialKind::MissingPermission => {
                    format!("neither the user's role nor an override grants '{name}'")
                }
                DenialKind::OverrideRevoked => format!("a user override revokes '{name}'"),
                DenialKind::OverrideExpired => format!("the user override for '{name}' has expired"),
                DenialKind::PermissionInactive => format!("permission '{name}' is inactive"),
                DenialKind::LookupFailed => {
                    format!("permission data for '{name}' could not be loaded")
                }
            };
            (None, Some(kind), reason)
        }
    };

    AuthorizationExplanation {
        required_permission: name.to_string(),
        granted: decision.is_granted(),
        source,
        denial,
        reason,
    }
}
