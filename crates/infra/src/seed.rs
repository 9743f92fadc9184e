//! Default permissions, roles and departments for a fresh store.
//!
//! Seeding is idempotent: rows that already exist (matched by permission
//! name, role name or department code) are left alone, so an operator's
//! edits to a seeded role survive a restart.

use std::collections::HashSet;

use ainventory_auth::{default_permissions, default_roles};
use ainventory_org::default_departments;

use crate::store::{Backoffice, StoreResult};

/// How many rows a seeding run created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions: usize,
    pub roles: usize,
    pub departments: usize,
}

pub async fn seed_defaults(store: &dyn Backoffice) -> StoreResult<SeedReport> {
    let mut report = SeedReport::default();

    let existing: HashSet<String> = store
        .list_permissions()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    for permission in default_permissions() {
        if existing.contains(&permission.name) {
            continue;
        }
        store.create_permission(permission).await?;
        report.permissions += 1;
    }

    for seeded in default_roles() {
        if store.find_role_by_name(&seeded.role.name).await?.is_some() {
            continue;
        }
        let role = store.create_role(seeded.role, seeded.is_system, None).await?;
        for permission in &seeded.permissions {
            store.grant_role_permission(role.id, permission, None).await?;
        }
        report.roles += 1;
    }

    let codes: HashSet<String> = store
        .list_departments()
        .await?
        .into_iter()
        .map(|d| d.code)
        .collect();
    for department in default_departments() {
        if department.code.as_ref().is_some_and(|code| codes.contains(code)) {
            continue;
        }
        store.create_department(department, None).await?;
        report.departments += 1;
    }

    tracing::info!(
        permissions = report.permissions,
        roles = report.roles,
        departments = report.departments,
        "default data seeded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::store::{AccessStore, DepartmentStore};

    #[tokio::test]
    async fn fresh_store_gets_the_full_catalogue() {
        let store = InMemoryStore::new();
        let report = seed_defaults(&store).await.unwrap();
        assert_eq!(
            report,
            SeedReport {
                permissions: default_permissions().len(),
                roles: 5,
                departments: 6,
            }
        );

        let default = store.default_role().await.unwrap().unwrap();
        assert_eq!(default.name, "manager");

        let super_admin = store.find_role_by_name("super_admin").await.unwrap().unwrap();
        assert!(super_admin.is_system);
        assert_eq!(
            store.role_permissions(super_admin.id).await.unwrap().len(),
            default_permissions().len()
        );
    }

    #[tokio::test]
    async fn second_run_creates_nothing() {
        let store = InMemoryStore::new();
        seed_defaults(&store).await.unwrap();
        let again = seed_defaults(&store).await.unwrap();
        assert_eq!(again, SeedReport::default());
        assert_eq!(store.list_departments().await.unwrap().len(), 6);
    }
}
