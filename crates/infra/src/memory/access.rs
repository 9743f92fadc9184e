use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ainventory_auth::{
    DepartmentGrantRequest, DepartmentPermission, NewPermission, NewRole, OverrideFact,
    OverrideRequest, Permission, PermissionFacts, Role, RoleChange, RoleHistoryAction,
    RoleHistoryEntry, RolePermission, RoleUpdate, User, UserPermission,
};
use ainventory_core::{DepartmentId, RoleId, UserId};

use super::{InMemoryStore, State, upsert};
use crate::store::{AccessStore, StoreError, StoreResult};

impl State {
    /// Clear `is_default` on every role but `keep`, recording each change.
    fn clear_other_defaults(&mut self, keep: RoleId, changed_by: Option<UserId>, now: DateTime<Utc>) {
        let mut entries = Vec::new();
        for role in self.roles.values_mut().filter(|r| r.id != keep && r.is_default) {
            role.is_default = false;
            let change = RoleChange {
                field_name: "is_default",
                old_value: true.to_string(),
                new_value: false.to_string(),
            };
            entries.push(
                RoleHistoryEntry::new(role.id, RoleHistoryAction::Update, changed_by, now)
                    .with_change(&change),
            );
        }
        self.role_history.extend(entries);
    }

    fn recount_role(&mut self, role_id: Option<RoleId>) {
        let Some(role_id) = role_id else { return };
        let count = self.count_users_with_role(role_id);
        if let Some(role) = self.roles.get_mut(&role_id) {
            role.user_count = count;
        }
    }
}

#[async_trait]
impl AccessStore for InMemoryStore {
    async fn create_permission(&self, input: NewPermission) -> StoreResult<Permission> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        if state.permissions.values().any(|p| p.name == input.name) {
            return Err(StoreError::conflict("permission already exists"));
        }
        let id = state.next_id("permissions");
        let permission = input.into_permission(id, Utc::now());
        upsert(&mut state.permissions, &permission);
        Ok(permission)
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<_> = state.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.module.cmp(&b.module).then_with(|| a.name.cmp(&b.name)));
        Ok(permissions)
    }

    async fn create_role(
        &self,
        input: NewRole,
        is_system: bool,
        created_by: Option<UserId>,
    ) -> StoreResult<Role> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        if state.roles.values().any(|r| r.name == input.name) {
            return Err(StoreError::conflict("role name already exists"));
        }

        let now = Utc::now();
        let id = state.next_id("roles");
        let role = input.into_role(id, is_system, created_by, now);
        if role.is_default {
            state.clear_other_defaults(id, created_by, now);
        }
        upsert(&mut state.roles, &role);

        let mut entry = RoleHistoryEntry::new(id, RoleHistoryAction::Create, created_by, now);
        entry.new_value = Some(role.name.clone());
        state.role_history.push(entry);
        Ok(role)
    }

    async fn update_role(
        &self,
        id: RoleId,
        update: RoleUpdate,
        changed_by: Option<UserId>,
    ) -> StoreResult<Role> {
        let mut state = self.state.write().await;
        let mut role = state.role(id)?.clone();
        let changes = update.apply(&mut role)?;
        if changes.is_empty() {
            return Ok(role);
        }

        let now = Utc::now();
        if role.is_default {
            state.clear_other_defaults(id, changed_by, now);
        }
        state.role_history.extend(changes.iter().map(|change| {
            RoleHistoryEntry::new(id, RoleHistoryAction::Update, changed_by, now).with_change(change)
        }));
        upsert(&mut state.roles, &role);
        Ok(role)
    }

    async fn delete_role(&self, id: RoleId, deleted_by: Option<UserId>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let role = state.role(id)?.clone();
        role.ensure_deletable(state.count_users_with_role(id))?;

        state.role_permissions.retain(|(role_id, _), _| *role_id != id);
        state.roles.remove(&id);
        let mut entry = RoleHistoryEntry::new(id, RoleHistoryAction::Delete, deleted_by, Utc::now());
        entry.old_value = Some(role.name);
        state.role_history.push(entry);
        Ok(())
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Role> {
        let state = self.state.read().await;
        state.role(id).cloned()
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<_> = state.roles.values().cloned().collect();
        roles.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.name.cmp(&b.name)));
        Ok(roles)
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let name = name.trim().to_lowercase();
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    async fn default_role(&self) -> StoreResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.is_default).cloned())
    }

    async fn grant_role_permission(
        &self,
        role_id: RoleId,
        permission: &str,
        granted_by: Option<UserId>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.role(role_id)?;
        let permission = state.permission_by_name(permission)?.clone();
        let key = (role_id, permission.id);
        if state.role_permissions.contains_key(&key) {
            return Ok(());
        }

        let now = Utc::now();
        state.role_permissions.insert(
            key,
            RolePermission {
                role_id,
                permission_id: permission.id,
                granted_by,
                granted_at: now,
            },
        );
        state.role_history.push(
            RoleHistoryEntry::new(role_id, RoleHistoryAction::PermissionGrant, granted_by, now)
                .with_permission(&permission.name),
        );
        Ok(())
    }

    async fn revoke_role_permission(
        &self,
        role_id: RoleId,
        permission: &str,
        revoked_by: Option<UserId>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.role(role_id)?;
        let permission = state.permission_by_name(permission)?.clone();
        if state
            .role_permissions
            .remove(&(role_id, permission.id))
            .is_some()
        {
            state.role_history.push(
                RoleHistoryEntry::new(
                    role_id,
                    RoleHistoryAction::PermissionRevoke,
                    revoked_by,
                    Utc::now(),
                )
                .with_permission(&permission.name),
            );
        }
        Ok(())
    }

    async fn role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<Permission>> {
        let state = self.state.read().await;
        state.role(role_id)?;
        let mut permissions: Vec<_> = state
            .role_permissions
            .keys()
            .filter(|(rid, _)| *rid == role_id)
            .filter_map(|(_, pid)| state.permissions.get(pid).cloned())
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn role_history(&self, role_id: RoleId) -> StoreResult<Vec<RoleHistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .role_history
            .iter()
            .filter(|entry| entry.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn assign_role(&self, user_id: UserId, role_id: Option<RoleId>) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if let Some(role_id) = role_id {
            state.role(role_id)?;
        }
        let user = state.user_mut(user_id)?;
        let previous = std::mem::replace(&mut user.role_id, role_id);
        let user = user.clone();

        state.recount_role(previous);
        state.recount_role(role_id);
        Ok(user)
    }

    async fn upsert_user_override(
        &self,
        user_id: UserId,
        request: OverrideRequest,
        granted_by: Option<UserId>,
    ) -> StoreResult<UserPermission> {
        let now = Utc::now();
        let request = request.normalized(now)?;
        let mut state = self.state.write().await;
        state.user(user_id)?;
        let permission_id = state.permission_by_name(&request.permission)?.id;

        let row = UserPermission {
            user_id,
            permission_id,
            is_granted: request.is_granted,
            expires_at: request.expires_at,
            reason: request.reason,
            granted_by,
            granted_at: now,
        };
        state.user_permissions.insert((user_id, permission_id), row.clone());
        Ok(row)
    }

    async fn user_overrides(&self, user_id: UserId) -> StoreResult<Vec<UserPermission>> {
        let state = self.state.read().await;
        state.user(user_id)?;
        Ok(state
            .user_permissions
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_department_grant(
        &self,
        department_id: DepartmentId,
        request: DepartmentGrantRequest,
        granted_by: Option<UserId>,
    ) -> StoreResult<DepartmentPermission> {
        let request = request.normalized()?;
        let mut state = self.state.write().await;
        state.department(department_id)?;
        let permission_id = state.permission_by_name(&request.permission)?.id;

        let row = DepartmentPermission {
            department_id,
            permission_id,
            is_granted: request.is_granted,
            reason: request.reason,
            granted_by,
            granted_at: Utc::now(),
        };
        state
            .department_permissions
            .insert((department_id, permission_id), row.clone());
        Ok(row)
    }

    async fn department_grants(
        &self,
        department_id: DepartmentId,
    ) -> StoreResult<Vec<DepartmentPermission>> {
        let state = self.state.read().await;
        state.department(department_id)?;
        Ok(state
            .department_permissions
            .values()
            .filter(|row| row.department_id == department_id)
            .cloned()
            .collect())
    }

    async fn permission_facts(
        &self,
        user_id: UserId,
        permission: &str,
    ) -> StoreResult<PermissionFacts> {
        let state = self.state.read().await;
        let user = state.user(user_id)?;
        let Ok(permission) = state.permission_by_name(permission) else {
            return Ok(PermissionFacts::default());
        };

        let role_grant = permission.is_active
            && user
                .role_id
                .is_some_and(|role_id| state.role_permissions.contains_key(&(role_id, permission.id)));
        let user_override = state
            .user_permissions
            .get(&(user_id, permission.id))
            .map(|row| OverrideFact {
                is_granted: row.is_granted,
                permission_active: permission.is_active,
                expires_at: row.expires_at,
            });

        Ok(PermissionFacts {
            role_grant,
            user_override,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IdentityStore;
    use ainventory_auth::{Gender, NewUser, evaluate};
    use chrono::Duration;

    fn role(name: &str, is_default: bool) -> NewRole {
        NewRole {
            name: name.into(),
            display_name: name.to_uppercase(),
            description: String::new(),
            level: 2,
            color: "blue".into(),
            is_default,
            is_active: true,
        }
    }

    fn permission(name: &str) -> NewPermission {
        NewPermission {
            name: name.into(),
            display_name: name.into(),
            description: String::new(),
            module: "products".into(),
            action: "view".into(),
            resource: None,
            is_active: true,
        }
    }

    async fn user(store: &InMemoryStore) -> User {
        store
            .create_user(NewUser {
                first_name: "Alan".into(),
                last_name: "Turing".into(),
                email: "alan@bletchley.uk".into(),
                password_hash: "hash".into(),
                gender: Gender::Male,
                role_id: None,
                joined_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn only_one_role_is_default() {
        let store = InMemoryStore::new();
        let first = store.create_role(role("clerk", true), false, None).await.unwrap();
        let second = store.create_role(role("buyer", true), false, None).await.unwrap();

        assert!(!store.get_role(first.id).await.unwrap().is_default);
        assert_eq!(store.default_role().await.unwrap().map(|r| r.id), Some(second.id));

        store
            .update_role(
                first.id,
                RoleUpdate {
                    is_default: Some(true),
                    ..RoleUpdate::default()
                },
                None,
            )
            .await
            .unwrap();
        let defaults: Vec<_> = store
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_default)
            .map(|r| r.id)
            .collect();
        assert_eq!(defaults, vec![first.id]);
    }

    #[tokio::test]
    async fn system_roles_and_roles_in_use_survive_delete() {
        let store = InMemoryStore::new();
        let system = store.create_role(role("root", false), true, None).await.unwrap();
        let err = store.delete_role(system.id, None).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot delete system role");

        let used = store.create_role(role("clerk", false), false, None).await.unwrap();
        let u = user(&store).await;
        store.assign_role(u.id, Some(used.id)).await.unwrap();
        assert_eq!(store.get_role(used.id).await.unwrap().user_count, 1);
        let err = store.delete_role(used.id, None).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot delete role with assigned users");

        store.assign_role(u.id, None).await.unwrap();
        assert_eq!(store.get_role(used.id).await.unwrap().user_count, 0);
        store.delete_role(used.id, None).await.unwrap();
        assert!(store.get_role(used.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn grants_are_idempotent_and_audited() {
        let store = InMemoryStore::new();
        let r = store.create_role(role("clerk", false), false, None).await.unwrap();
        store.create_permission(permission("products.view")).await.unwrap();

        store.grant_role_permission(r.id, "products.view", None).await.unwrap();
        store.grant_role_permission(r.id, "PRODUCTS.VIEW", None).await.unwrap();
        assert_eq!(store.role_permissions(r.id).await.unwrap().len(), 1);

        store.revoke_role_permission(r.id, "products.view", None).await.unwrap();
        store.revoke_role_permission(r.id, "products.view", None).await.unwrap();
        assert!(store.role_permissions(r.id).await.unwrap().is_empty());

        let actions: Vec<_> = store
            .role_history(r.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                RoleHistoryAction::Create,
                RoleHistoryAction::PermissionGrant,
                RoleHistoryAction::PermissionRevoke,
            ]
        );
    }

    #[tokio::test]
    async fn no_role_and_no_override_is_denied() {
        let store = InMemoryStore::new();
        store.create_permission(permission("products.view")).await.unwrap();
        let u = user(&store).await;
        let facts = store.permission_facts(u.id, "products.view").await.unwrap();
        assert!(!evaluate(&facts, Utc::now()).is_granted());
    }

    #[tokio::test]
    async fn role_grant_and_override_feed_the_evaluator() {
        let store = InMemoryStore::new();
        store.create_permission(permission("products.view")).await.unwrap();
        store.create_permission(permission("products.edit")).await.unwrap();
        let r = store.create_role(role("clerk", false), false, None).await.unwrap();
        store.grant_role_permission(r.id, "products.view", None).await.unwrap();
        let u = user(&store).await;
        store.assign_role(u.id, Some(r.id)).await.unwrap();

        let facts = store.permission_facts(u.id, "products.view").await.unwrap();
        assert!(facts.role_grant);

        let future = Utc::now() + Duration::hours(1);
        store
            .upsert_user_override(
                u.id,
                OverrideRequest {
                    permission: "products.edit".into(),
                    is_granted: true,
                    expires_at: Some(future),
                    reason: Some("cover for holiday".into()),
                },
                None,
            )
            .await
            .unwrap();
        let facts = store.permission_facts(u.id, "products.edit").await.unwrap();
        assert!(!facts.role_grant);
        assert!(evaluate(&facts, Utc::now()).is_granted());
        // The same override evaluated after it lapses.
        assert!(!evaluate(&facts, future + Duration::seconds(1)).is_granted());
    }

    #[tokio::test]
    async fn unknown_permission_yields_empty_facts() {
        let store = InMemoryStore::new();
        let u = user(&store).await;
        let facts = store.permission_facts(u.id, "nothing.here").await.unwrap();
        assert_eq!(facts, PermissionFacts::default());
    }
}
