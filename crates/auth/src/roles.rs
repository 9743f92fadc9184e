use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult, Entity, PermissionId, RoleId, UserId};

use crate::permissions::default_permissions;

/// Highest role level (super administrator).
pub const MAX_ROLE_LEVEL: u8 = 5;

/// A named bundle of permissions assignable to users.
///
/// # Invariants
/// - `level` is within `0..=MAX_ROLE_LEVEL`.
/// - At most one role in a store has `is_default` set (enforced by the store,
///   which clears the flag on every other role in the same transaction).
/// - System roles and roles with assigned users are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub level: u8,
    pub color: String,
    pub is_default: bool,
    pub is_system: bool,
    pub is_active: bool,
    pub user_count: i64,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Check the deletion guard against the live count of users holding the role.
    pub fn ensure_deletable(&self, assigned_users: i64) -> DomainResult<()> {
        if self.is_system {
            return Err(DomainError::invariant("cannot delete system role"));
        }
        if assigned_users > 0 {
            return Err(DomainError::invariant(
                "cannot delete role with assigned users",
            ));
        }
        Ok(())
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> RoleId {
        self.id
    }
}

fn default_level() -> u8 {
    1
}

fn default_color() -> String {
    "blue".to_string()
}

fn default_true() -> bool {
    true
}

/// Input for creating a role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn validate_level(level: u8) -> DomainResult<()> {
    if level > MAX_ROLE_LEVEL {
        return Err(DomainError::validation(format!(
            "role level must be between 0 and {MAX_ROLE_LEVEL}"
        )));
    }
    Ok(())
}

impl NewRole {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.name = self.name.trim().to_lowercase();
        self.display_name = self.display_name.trim().to_string();
        self.description = self.description.trim().to_string();
        self.color = self.color.trim().to_string();

        if self.name.is_empty() || self.name.len() > 100 {
            return Err(DomainError::validation(
                "role name must be between 1 and 100 characters",
            ));
        }
        if self.display_name.is_empty() || self.display_name.len() > 150 {
            return Err(DomainError::validation(
                "display name must be between 1 and 150 characters",
            ));
        }
        if self.description.len() > 500 {
            return Err(DomainError::validation(
                "description must be at most 500 characters",
            ));
        }
        if self.color.len() > 20 {
            return Err(DomainError::validation("color must be at most 20 characters"));
        }
        validate_level(self.level)?;
        Ok(self)
    }

    pub fn into_role(
        self,
        id: RoleId,
        is_system: bool,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Role {
        Role {
            id,
            name: self.name,
            display_name: self.display_name,
            description: self.description,
            level: self.level,
            color: self.color,
            is_default: self.is_default,
            is_system,
            is_active: self.is_active,
            user_count: 0,
            created_by,
            created_at: now,
        }
    }
}

/// Partial update of a role. The name of a role is immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub level: Option<u8>,
    pub color: Option<String>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
}

/// One changed field, recorded in the role history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChange {
    pub field_name: &'static str,
    pub old_value: String,
    pub new_value: String,
}

impl RoleUpdate {
    /// Apply the update in place and return the changed fields.
    pub fn apply(self, role: &mut Role) -> DomainResult<Vec<RoleChange>> {
        let mut changes = Vec::new();
        let mut record = |field_name: &'static str, old: String, new: String| {
            if old != new {
                changes.push(RoleChange {
                    field_name,
                    old_value: old,
                    new_value: new,
                });
            }
        };

        if let Some(display_name) = self.display_name {
            let display_name = display_name.trim().to_string();
            if display_name.is_empty() || display_name.len() > 150 {
                return Err(DomainError::validation(
                    "display name must be between 1 and 150 characters",
                ));
            }
            record("display_name", role.display_name.clone(), display_name.clone());
            role.display_name = display_name;
        }
        if let Some(description) = self.description {
            let description = description.trim().to_string();
            if description.len() > 500 {
                return Err(DomainError::validation(
                    "description must be at most 500 characters",
                ));
            }
            record("description", role.description.clone(), description.clone());
            role.description = description;
        }
        if let Some(level) = self.level {
            validate_level(level)?;
            record("level", role.level.to_string(), level.to_string());
            role.level = level;
        }
        if let Some(color) = self.color {
            let color = color.trim().to_string();
            record("color", role.color.clone(), color.clone());
            role.color = color;
        }
        if let Some(is_default) = self.is_default {
            record("is_default", role.is_default.to_string(), is_default.to_string());
            role.is_default = is_default;
        }
        if let Some(is_active) = self.is_active {
            record("is_active", role.is_active.to_string(), is_active.to_string());
            role.is_active = is_active;
        }
        Ok(changes)
    }
}

/// Role ↔ permission link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleHistoryAction {
    Create,
    Update,
    Delete,
    PermissionGrant,
    PermissionRevoke,
}

impl RoleHistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::PermissionGrant => "PERMISSION_GRANT",
            Self::PermissionRevoke => "PERMISSION_REVOKE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CREATE" => Some(Self::Create),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "PERMISSION_GRANT" => Some(Self::PermissionGrant),
            "PERMISSION_REVOKE" => Some(Self::PermissionRevoke),
            _ => None,
        }
    }
}

/// Audit trail row for role mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleHistoryEntry {
    pub role_id: RoleId,
    pub action: RoleHistoryAction,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Option<UserId>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RoleHistoryEntry {
    pub fn new(
        role_id: RoleId,
        action: RoleHistoryAction,
        changed_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            role_id,
            action,
            field_name: None,
            old_value: None,
            new_value: None,
            changed_by,
            reason: None,
            created_at: now,
        }
    }

    pub fn with_change(mut self, change: &RoleChange) -> Self {
        self.field_name = Some(change.field_name.to_string());
        self.old_value = Some(change.old_value.clone());
        self.new_value = Some(change.new_value.clone());
        self
    }

    /// Grant/revoke entries carry the permission name as the new/old value.
    pub fn with_permission(mut self, permission_name: &str) -> Self {
        self.field_name = Some("permission".to_string());
        match self.action {
            RoleHistoryAction::PermissionRevoke => {
                self.old_value = Some(permission_name.to_string())
            }
            _ => self.new_value = Some(permission_name.to_string()),
        }
        self
    }
}

/// A role seeded into a fresh store, with its permission set.
#[derive(Debug, Clone)]
pub struct DefaultRole {
    pub role: NewRole,
    pub is_system: bool,
    pub permissions: Vec<String>,
}

fn default_role(
    name: &str,
    display_name: &str,
    description: &str,
    level: u8,
    color: &str,
    is_default: bool,
    is_system: bool,
) -> DefaultRole {
    DefaultRole {
        role: NewRole {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            level,
            color: color.to_string(),
            is_default,
            is_active: true,
        },
        is_system,
        permissions: default_role_permissions(name),
    }
}

/// The default role set (manager is the default role for new users).
pub fn default_roles() -> Vec<DefaultRole> {
    vec![
        default_role("super_admin", "Super Administrator", "Full system access with all permissions", 5, "red", false, true),
        default_role("admin", "Administrator", "Administrative access excluding user management", 4, "purple", false, true),
        default_role("manager", "Manager", "Management level access to products, orders, and customers", 3, "blue", true, false),
        default_role("warehouse_staff", "Warehouse Staff", "Access to inventory and order processing", 2, "green", false, false),
        default_role("sales_rep", "Sales Representative", "Customer and order management access", 1, "orange", false, false),
    ]
}

/// Permission names granted to a default role.
pub fn default_role_permissions(role_name: &str) -> Vec<String> {
    let all: Vec<String> = default_permissions().into_iter().map(|p| p.name).collect();
    let pick = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();

    match role_name {
        "super_admin" => all,
        "admin" => all
            .into_iter()
            .filter(|name| {
                !matches!(
                    name.as_str(),
                    "users.create" | "users.edit" | "users.delete" | "roles.manage"
                )
            })
            .collect(),
        "manager" => all
            .into_iter()
            .filter(|name| {
                name.starts_with("dashboard.")
                    || name.starts_with("products.")
                    || name.starts_with("orders.")
                    || name.starts_with("customers.")
                    || name.starts_with("reports.")
            })
            .collect(),
        "warehouse_staff" => pick(&[
            "dashboard.view",
            "products.view",
            "products.manage_inventory",
            "orders.view",
            "orders.process",
        ]),
        "sales_rep" => pick(&[
            "dashboard.view",
            "products.view",
            "customers.view",
            "customers.create",
            "customers.edit",
            "orders.view",
            "orders.create",
            "orders.edit",
        ]),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn role(is_system: bool) -> Role {
        NewRole {
            name: "Auditor".into(),
            display_name: "Auditor".into(),
            description: String::new(),
            level: 2,
            color: "blue".into(),
            is_default: false,
            is_active: true,
        }
        .normalized()
        .unwrap()
        .into_role(RoleId::new(9), is_system, None, now())
    }

    #[test]
    fn system_roles_are_never_deletable() {
        let err = role(true).ensure_deletable(0).unwrap_err();
        assert_eq!(err.to_string(), "cannot delete system role");
    }

    #[test]
    fn roles_with_users_are_never_deletable() {
        let err = role(false).ensure_deletable(3).unwrap_err();
        assert_eq!(err.to_string(), "cannot delete role with assigned users");
        assert!(role(false).ensure_deletable(0).is_ok());
    }

    #[test]
    fn level_above_five_is_rejected() {
        let mut input = NewRole {
            name: "x".into(),
            display_name: "X".into(),
            description: String::new(),
            level: 6,
            color: "red".into(),
            is_default: false,
            is_active: true,
        };
        assert!(matches!(input.clone().normalized(), Err(DomainError::Validation(_))));
        input.level = 5;
        assert_eq!(input.normalized().unwrap().name, "x");

        let mut r = role(false);
        let update = RoleUpdate {
            level: Some(9),
            ..Default::default()
        };
        assert!(update.apply(&mut r).is_err());
    }

    #[test]
    fn update_reports_only_changed_fields() {
        let mut r = role(false);
        let changes = RoleUpdate {
            level: Some(2),
            color: Some("teal".into()),
            is_default: Some(true),
            ..Default::default()
        }
        .apply(&mut r)
        .unwrap();

        let fields: Vec<_> = changes.iter().map(|c| c.field_name).collect();
        assert_eq!(fields, vec!["color", "is_default"]);
        assert!(r.is_default);
        assert_eq!(r.color, "teal");
    }

    #[test]
    fn exactly_one_default_role_is_seeded() {
        let roles = default_roles();
        assert_eq!(roles.iter().filter(|r| r.role.is_default).count(), 1);
        assert_eq!(roles.iter().filter(|r| r.is_system).count(), 2);
    }

    #[test]
    fn admin_excludes_user_management() {
        let admin = default_role_permissions("admin");
        assert!(admin.contains(&"users.view".to_string()));
        assert!(!admin.contains(&"roles.manage".to_string()));
        assert_eq!(
            default_role_permissions("super_admin").len(),
            default_permissions().len()
        );
        assert!(default_role_permissions("nobody").is_empty());
    }

    #[test]
    fn revoke_history_keeps_permission_as_old_value() {
        let entry = RoleHistoryEntry::new(RoleId::new(1), RoleHistoryAction::PermissionRevoke, None, now())
            .with_permission("orders.view");
        assert_eq!(entry.old_value.as_deref(), Some("orders.view"));
        assert_eq!(entry.new_value, None);
    }
}
