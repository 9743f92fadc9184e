use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult, Entity, PermissionId};

/// Permission name as checked by the evaluator (e.g. `"products.manage_inventory"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionName(Cow<'static, str>);

impl PermissionName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PermissionName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Actions a permission may describe.
pub const VALID_ACTIONS: [&str; 8] = [
    "view", "create", "edit", "delete", "manage", "export", "import", "approve",
];

pub fn is_valid_action(action: &str) -> bool {
    VALID_ACTIONS.contains(&action)
}

/// An atomic named capability (module + action [+ resource]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub module: String,
    pub action: String,
    pub resource: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn is_valid_action(&self) -> bool {
        is_valid_action(&self.action)
    }

    /// `module:action` or `module:action:resource`.
    pub fn full_name(&self) -> String {
        match self.resource.as_deref() {
            Some(resource) => format!("{}:{}:{}", self.module, self.action, resource),
            None => format!("{}:{}", self.module, self.action),
        }
    }

    pub fn name(&self) -> PermissionName {
        PermissionName::new(self.name.clone())
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> PermissionId {
        self.id
    }
}

fn default_true() -> bool {
    true
}

/// Input for creating a permission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub module: String,
    pub action: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewPermission {
    /// Trim and lowercase the identifying fields, then validate them.
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.name = self.name.trim().to_lowercase();
        self.display_name = self.display_name.trim().to_string();
        self.description = self.description.trim().to_string();
        self.module = self.module.trim().to_lowercase();
        self.action = self.action.trim().to_lowercase();
        self.resource = self
            .resource
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty());

        if self.name.is_empty() || self.name.len() > 100 {
            return Err(DomainError::validation(
                "permission name must be between 1 and 100 characters",
            ));
        }
        if self.display_name.is_empty() || self.display_name.len() > 150 {
            return Err(DomainError::validation(
                "display name must be between 1 and 150 characters",
            ));
        }
        if self.module.is_empty() || self.module.len() > 50 {
            return Err(DomainError::validation(
                "module must be between 1 and 50 characters",
            ));
        }
        if !is_valid_action(&self.action) {
            return Err(DomainError::validation(format!(
                "action must be one of: {}",
                VALID_ACTIONS.join(", ")
            )));
        }
        if self.description.len() > 500 {
            return Err(DomainError::validation(
                "description must be at most 500 characters",
            ));
        }
        Ok(self)
    }

    pub fn into_permission(self, id: PermissionId, now: DateTime<Utc>) -> Permission {
        Permission {
            id,
            name: self.name,
            display_name: self.display_name,
            description: self.description,
            module: self.module,
            action: self.action,
            resource: self.resource,
            is_active: self.is_active,
            created_at: now,
        }
    }
}

/// Group active permissions by module, each group sorted by name.
pub fn group_by_module(
    permissions: impl IntoIterator<Item = Permission>,
) -> BTreeMap<String, Vec<Permission>> {
    let mut grouped: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
    for permission in permissions.into_iter().filter(|p| p.is_active) {
        grouped
            .entry(permission.module.clone())
            .or_default()
            .push(permission);
    }
    for group in grouped.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
    grouped
}

fn seed(
    name: &str,
    display_name: &str,
    module: &str,
    action: &str,
    resource: Option<&str>,
    description: &str,
) -> NewPermission {
    NewPermission {
        name: name.to_string(),
        display_name: display_name.to_string(),
        description: description.to_string(),
        module: module.to_string(),
        action: action.to_string(),
        resource: resource.map(str::to_string),
        is_active: true,
    }
}

/// The permission catalogue seeded into a fresh store.
pub fn default_permissions() -> Vec<NewPermission> {
    vec![
        seed("dashboard.view", "View Dashboard", "dashboard", "view", None, "Access to main dashboard"),
        seed("dashboard.analytics", "View Analytics", "dashboard", "view", Some("analytics"), "Access to analytics and reports"),
        seed("products.view", "View Products", "products", "view", None, "View product listings"),
        seed("products.create", "Create Products", "products", "create", None, "Add new products"),
        seed("products.edit", "Edit Products", "products", "edit", None, "Modify existing products"),
        seed("products.delete", "Delete Products", "products", "delete", None, "Remove products"),
        seed("products.manage_inventory", "Manage Inventory", "products", "manage", Some("inventory"), "Manage stock levels"),
        seed("orders.view", "View Orders", "orders", "view", None, "View order listings"),
        seed("orders.create", "Create Orders", "orders", "create", None, "Create new orders"),
        seed("orders.edit", "Edit Orders", "orders", "edit", None, "Modify existing orders"),
        seed("orders.delete", "Delete Orders", "orders", "delete", None, "Remove orders"),
        seed("orders.process", "Process Orders", "orders", "manage", Some("processing"), "Process and fulfill orders"),
        seed("customers.view", "View Customers", "customers", "view", None, "View customer listings"),
        seed("customers.create", "Create Customers", "customers", "create", None, "Add new customers"),
        seed("customers.edit", "Edit Customers", "customers", "edit", None, "Modify customer information"),
        seed("customers.delete", "Delete Customers", "customers", "delete", None, "Remove customers"),
        seed("users.view", "View Users", "users", "view", None, "View system users"),
        seed("users.create", "Create Users", "users", "create", None, "Add new users"),
        seed("users.edit", "Edit Users", "users", "edit", None, "Modify user information"),
        seed("users.delete", "Delete Users", "users", "delete", None, "Remove users"),
        seed("roles.manage", "Manage Roles", "users", "manage", Some("roles"), "Manage user roles and permissions"),
        seed("reports.view", "View Reports", "reports", "view", None, "Access to reports"),
        seed("reports.export", "Export Reports", "reports", "export", None, "Export report data"),
        seed("settings.view", "View Settings", "settings", "view", None, "View system settings"),
        seed("settings.edit", "Edit Settings", "settings", "edit", None, "Modify system settings"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission(name: &str, module: &str, action: &str, resource: Option<&str>) -> Permission {
        seed(name, name, module, action, resource, "")
            .into_permission(PermissionId::new(1), Utc::now())
    }

    #[test]
    fn full_name_includes_resource_when_present() {
        assert_eq!(
            permission("products.view", "products", "view", None).full_name(),
            "products:view"
        );
        assert_eq!(
            permission("roles.manage", "users", "manage", Some("roles")).full_name(),
            "users:manage:roles"
        );
    }

    #[test]
    fn action_validation_accepts_only_known_actions() {
        assert!(permission("a", "m", "approve", None).is_valid_action());
        assert!(!permission("a", "m", "analytics", None).is_valid_action());
    }

    #[test]
    fn normalization_trims_lowercases_and_validates() {
        let input = NewPermission {
            name: "  Reports.Audit ".into(),
            display_name: " Audit ".into(),
            description: String::new(),
            module: "Reports".into(),
            action: "VIEW".into(),
            resource: Some("   ".into()),
            is_active: true,
        };
        let normalized = input.normalized().unwrap();
        assert_eq!(normalized.name, "reports.audit");
        assert_eq!(normalized.action, "view");
        assert_eq!(normalized.resource, None);

        let bad = NewPermission {
            action: "explode".into(),
            ..normalized
        };
        assert!(matches!(bad.normalized(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn default_catalogue_is_valid_and_unique() {
        let defaults = default_permissions();
        let mut names: Vec<_> = defaults.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), defaults.len());
        for permission in defaults {
            assert!(permission.normalized().is_ok());
        }
    }

    #[test]
    fn grouping_skips_inactive_permissions() {
        let mut inactive = permission("orders.delete", "orders", "delete", None);
        inactive.is_active = false;
        let grouped = group_by_module(vec![
            permission("orders.view", "orders", "view", None),
            inactive,
            permission("products.view", "products", "view", None),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["orders"].len(), 1);
        assert_eq!(grouped["orders"][0].name, "orders.view");
    }
}
