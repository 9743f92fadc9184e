//! Direct permission grants that bypass role membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ainventory_core::{DepartmentId, DomainError, DomainResult, PermissionId, UserId};

/// Per-user grant or revoke of a single permission, with optional expiry.
///
/// An override with `is_granted = false`, or one whose `expires_at` has passed,
/// never counts as a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    pub user_id: UserId,
    pub permission_id: PermissionId,
    pub is_granted: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
}

impl UserPermission {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Department-scoped grant.
///
/// Stored and listable, but not consulted by the permission evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentPermission {
    pub department_id: DepartmentId,
    pub permission_id: PermissionId,
    pub is_granted: bool,
    pub reason: Option<String>,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
}

/// Request to upsert a user override, addressed by permission name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverrideRequest {
    pub permission: String,
    pub is_granted: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl OverrideRequest {
    pub fn normalized(mut self, now: DateTime<Utc>) -> DomainResult<Self> {
        self.permission = self.permission.trim().to_lowercase();
        self.reason = self
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if self.permission.is_empty() {
            return Err(DomainError::validation("permission is required"));
        }
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(DomainError::validation("expires_at must be in the future"));
        }
        if self.reason.as_ref().is_some_and(|r| r.len() > 500) {
            return Err(DomainError::validation("reason must be at most 500 characters"));
        }
        Ok(self)
    }
}

/// Request to upsert a department grant. Department grants never expire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepartmentGrantRequest {
    pub permission: String,
    pub is_granted: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl DepartmentGrantRequest {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.permission = self.permission.trim().to_lowercase();
        self.reason = self
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if self.permission.is_empty() {
            return Err(DomainError::validation("permission is required"));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_exclusive_of_now() {
        let now = Utc::now();
        let mut row = UserPermission {
            user_id: UserId::new(1),
            permission_id: PermissionId::new(1),
            is_granted: true,
            expires_at: None,
            reason: None,
            granted_by: None,
            granted_at: now,
        };
        assert!(!row.is_expired(now));
        row.expires_at = Some(now);
        assert!(row.is_expired(now));
        row.expires_at = Some(now + Duration::seconds(1));
        assert!(!row.is_expired(now));
    }

    #[test]
    fn override_request_rejects_past_expiry() {
        let now = Utc::now();
        let request = OverrideRequest {
            permission: " Orders.View ".into(),
            is_granted: true,
            expires_at: Some(now - Duration::hours(1)),
            reason: None,
        };
        assert!(matches!(request.normalized(now), Err(DomainError::Validation(_))));

        let request = OverrideRequest {
            permission: " Orders.View ".into(),
            is_granted: true,
            expires_at: None,
            reason: Some("  ".into()),
        };
        let normalized = request.normalized(now).unwrap();
        assert_eq!(normalized.permission, "orders.view");
        assert_eq!(normalized.reason, None);
    }
}
