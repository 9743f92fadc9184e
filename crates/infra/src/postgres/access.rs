use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use ainventory_auth::{
    DepartmentGrantRequest, DepartmentPermission, NewPermission, NewRole, OverrideFact,
    OverrideRequest, Permission, PermissionFacts, Role, RoleChange, RoleHistoryAction,
    RoleHistoryEntry, RoleUpdate, User, UserPermission,
};
use ainventory_core::{DepartmentId, RoleId, UserId};

use super::identity::{ensure_role_exists, recount_role, save_user, user_for_update};
use super::rows::Db;
use super::{PostgresStore, commit, ensure_exists, map_sqlx_error};
use crate::store::{AccessStore, StoreError, StoreResult};

async fn insert_history(conn: &mut PgConnection, entry: &RoleHistoryEntry) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO role_history (role_id, action, field_name, old_value, new_value, changed_by, reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.role_id.get())
    .bind(entry.action.as_str())
    .bind(&entry.field_name)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(entry.changed_by.map(|id| id.get()))
    .bind(&entry.reason)
    .bind(entry.created_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_role_history", e))?;
    Ok(())
}

async fn role_for_update(conn: &mut PgConnection, id: RoleId) -> StoreResult<Role> {
    sqlx::query_as::<_, Db<Role>>("SELECT * FROM roles WHERE id = $1 FOR UPDATE")
        .bind(id.get())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("role_for_update", e))?
        .map(Db::into_inner)
        .ok_or_else(|| StoreError::not_found("role"))
}

async fn permission_by_name(conn: &mut PgConnection, name: &str) -> StoreResult<Permission> {
    sqlx::query_as::<_, Db<Permission>>("SELECT * FROM permissions WHERE name = $1")
        .bind(name.trim().to_lowercase())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("permission_by_name", e))?
        .map(Db::into_inner)
        .ok_or_else(|| StoreError::not_found("permission"))
}

/// Clear `is_default` on every role but `keep`, recording each change.
async fn clear_other_defaults(
    conn: &mut PgConnection,
    keep: RoleId,
    changed_by: Option<UserId>,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let cleared: Vec<i64> = sqlx::query_scalar(
        "UPDATE roles SET is_default = FALSE WHERE is_default AND id <> $1 RETURNING id",
    )
    .bind(keep.get())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("clear_other_defaults", e))?;

    let change = RoleChange {
        field_name: "is_default",
        old_value: true.to_string(),
        new_value: false.to_string(),
    };
    for id in cleared {
        let entry = RoleHistoryEntry::new(RoleId::from(id), RoleHistoryAction::Update, changed_by, now)
            .with_change(&change);
        insert_history(&mut *conn, &entry).await?;
    }
    Ok(())
}

#[async_trait]
impl AccessStore for PostgresStore {
    #[instrument(skip(self, input), fields(name = %input.name), err)]
    async fn create_permission(&self, input: NewPermission) -> StoreResult<Permission> {
        let input = input.normalized()?;
        let row = sqlx::query_as::<_, Db<Permission>>(
            r#"
            INSERT INTO permissions (name, display_name, description, module, action, resource, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.display_name)
        .bind(&input.description)
        .bind(&input.module)
        .bind(&input.action)
        .bind(&input.resource)
        .bind(input.is_active)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_permission", e))?;
        Ok(row.into_inner())
    }

    #[instrument(skip(self), err)]
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, Db<Permission>>(
            "SELECT * FROM permissions ORDER BY module, name",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_permissions", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }

    #[instrument(skip(self, input), fields(name = %input.name), err)]
    async fn create_role(
        &self,
        input: NewRole,
        is_system: bool,
        created_by: Option<UserId>,
    ) -> StoreResult<Role> {
        let input = input.normalized()?;
        let now = Utc::now();
        let mut tx = self.begin().await?;

        if input.is_default {
            clear_other_defaults(&mut tx, RoleId::from(0), created_by, now).await?;
        }
        let role = sqlx::query_as::<_, Db<Role>>(
            r#"
            INSERT INTO roles (name, display_name, description, level, color, is_default, is_system, is_active, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.display_name)
        .bind(&input.description)
        .bind(i16::from(input.level))
        .bind(&input.color)
        .bind(input.is_default)
        .bind(is_system)
        .bind(input.is_active)
        .bind(created_by.map(|id| id.get()))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_role", e))?
        .into_inner();

        let mut entry = RoleHistoryEntry::new(role.id, RoleHistoryAction::Create, created_by, now);
        entry.new_value = Some(role.name.clone());
        insert_history(&mut tx, &entry).await?;
        commit(tx).await?;
        Ok(role)
    }

    #[instrument(skip(self, update), err)]
    async fn update_role(
        &self,
        id: RoleId,
        update: RoleUpdate,
        changed_by: Option<UserId>,
    ) -> StoreResult<Role> {
        let mut tx = self.begin().await?;
        let mut role = role_for_update(&mut tx, id).await?;
        let changes = update.apply(&mut role)?;
        if changes.is_empty() {
            return Ok(role);
        }

        let now = Utc::now();
        if role.is_default {
            clear_other_defaults(&mut tx, id, changed_by, now).await?;
        }
        sqlx::query(
            r#"
            UPDATE roles SET display_name = $2, description = $3, level = $4, color = $5,
                is_default = $6, is_active = $7
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(i16::from(role.level))
        .bind(&role.color)
        .bind(role.is_default)
        .bind(role.is_active)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;

        for change in &changes {
            let entry = RoleHistoryEntry::new(id, RoleHistoryAction::Update, changed_by, now)
                .with_change(change);
            insert_history(&mut tx, &entry).await?;
        }
        commit(tx).await?;
        Ok(role)
    }

    #[instrument(skip(self), err)]
    async fn delete_role(&self, id: RoleId, deleted_by: Option<UserId>) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let role = role_for_update(&mut tx, id).await?;
        let assigned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(id.get())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        role.ensure_deletable(assigned)?;

        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        let mut entry = RoleHistoryEntry::new(id, RoleHistoryAction::Delete, deleted_by, Utc::now());
        entry.old_value = Some(role.name);
        insert_history(&mut tx, &entry).await?;
        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn get_role(&self, id: RoleId) -> StoreResult<Role> {
        sqlx::query_as::<_, Db<Role>>("SELECT * FROM roles WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?
            .map(Db::into_inner)
            .ok_or_else(|| StoreError::not_found("role"))
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, Db<Role>>("SELECT * FROM roles ORDER BY level DESC, name")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }

    #[instrument(skip(self), err)]
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let row = sqlx::query_as::<_, Db<Role>>("SELECT * FROM roles WHERE name = $1")
            .bind(name.trim().to_lowercase())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;
        Ok(row.map(Db::into_inner))
    }

    #[instrument(skip(self), err)]
    async fn default_role(&self) -> StoreResult<Option<Role>> {
        let row = sqlx::query_as::<_, Db<Role>>("SELECT * FROM roles WHERE is_default LIMIT 1")
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("default_role", e))?;
        Ok(row.map(Db::into_inner))
    }

    #[instrument(skip(self), err)]
    async fn grant_role_permission(
        &self,
        role_id: RoleId,
        permission: &str,
        granted_by: Option<UserId>,
    ) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        ensure_role_exists(&mut tx, role_id).await?;
        let permission = permission_by_name(&mut tx, permission).await?;
        let now = Utc::now();

        let inserted = sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id, granted_by, granted_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role_id.get())
        .bind(permission.id.get())
        .bind(granted_by.map(|id| id.get()))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("grant_role_permission", e))?
        .rows_affected();

        if inserted > 0 {
            let entry =
                RoleHistoryEntry::new(role_id, RoleHistoryAction::PermissionGrant, granted_by, now)
                    .with_permission(&permission.name);
            insert_history(&mut tx, &entry).await?;
        }
        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn revoke_role_permission(
        &self,
        role_id: RoleId,
        permission: &str,
        revoked_by: Option<UserId>,
    ) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        ensure_role_exists(&mut tx, role_id).await?;
        let permission = permission_by_name(&mut tx, permission).await?;

        let removed = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2",
        )
        .bind(role_id.get())
        .bind(permission.id.get())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("revoke_role_permission", e))?
        .rows_affected();

        if removed > 0 {
            let entry = RoleHistoryEntry::new(
                role_id,
                RoleHistoryAction::PermissionRevoke,
                revoked_by,
                Utc::now(),
            )
            .with_permission(&permission.name);
            insert_history(&mut tx, &entry).await?;
        }
        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<Permission>> {
        let mut conn = self.acquire().await?;
        ensure_role_exists(&mut conn, role_id).await?;
        let rows = sqlx::query_as::<_, Db<Permission>>(
            r#"
            SELECT p.* FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(role_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("role_permissions", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }

    #[instrument(skip(self), err)]
    async fn role_history(&self, role_id: RoleId) -> StoreResult<Vec<RoleHistoryEntry>> {
        let rows = sqlx::query_as::<_, Db<RoleHistoryEntry>>(
            "SELECT * FROM role_history WHERE role_id = $1 ORDER BY id",
        )
        .bind(role_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_history", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }

    #[instrument(skip(self), err)]
    async fn assign_role(&self, user_id: UserId, role_id: Option<RoleId>) -> StoreResult<User> {
        let mut tx = self.begin().await?;
        if let Some(role_id) = role_id {
            ensure_role_exists(&mut tx, role_id).await?;
        }
        let mut user = user_for_update(&mut tx, user_id).await?;
        let previous = std::mem::replace(&mut user.role_id, role_id);
        save_user(&mut tx, &user).await?;
        recount_role(&mut tx, previous).await?;
        recount_role(&mut tx, role_id).await?;
        commit(tx).await?;
        Ok(user)
    }

    #[instrument(skip(self, request), fields(permission = %request.permission), err)]
    async fn upsert_user_override(
        &self,
        user_id: UserId,
        request: OverrideRequest,
        granted_by: Option<UserId>,
    ) -> StoreResult<UserPermission> {
        let now = Utc::now();
        let request = request.normalized(now)?;
        let mut tx = self.begin().await?;
        user_for_update(&mut tx, user_id).await?;
        let permission = permission_by_name(&mut tx, &request.permission).await?;

        let row = sqlx::query_as::<_, Db<UserPermission>>(
            r#"
            INSERT INTO user_permissions (user_id, permission_id, is_granted, expires_at, reason, granted_by, granted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, permission_id) DO UPDATE SET
                is_granted = EXCLUDED.is_granted,
                expires_at = EXCLUDED.expires_at,
                reason = EXCLUDED.reason,
                granted_by = EXCLUDED.granted_by,
                granted_at = EXCLUDED.granted_at
            RETURNING *
            "#,
        )
        .bind(user_id.get())
        .bind(permission.id.get())
        .bind(request.is_granted)
        .bind(request.expires_at)
        .bind(&request.reason)
        .bind(granted_by.map(|id| id.get()))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_user_override", e))?;
        commit(tx).await?;
        Ok(row.into_inner())
    }

    #[instrument(skip(self), err)]
    async fn user_overrides(&self, user_id: UserId) -> StoreResult<Vec<UserPermission>> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "users", user_id.get(), "user").await?;
        let rows = sqlx::query_as::<_, Db<UserPermission>>(
            "SELECT * FROM user_permissions WHERE user_id = $1 ORDER BY permission_id",
        )
        .bind(user_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("user_overrides", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }

    #[instrument(skip(self, request), fields(permission = %request.permission), err)]
    async fn upsert_department_grant(
        &self,
        department_id: DepartmentId,
        request: DepartmentGrantRequest,
        granted_by: Option<UserId>,
    ) -> StoreResult<DepartmentPermission> {
        let request = request.normalized()?;
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, "departments", department_id.get(), "department").await?;
        let permission = permission_by_name(&mut tx, &request.permission).await?;

        let row = sqlx::query_as::<_, Db<DepartmentPermission>>(
            r#"
            INSERT INTO department_permissions (department_id, permission_id, is_granted, reason, granted_by, granted_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (department_id, permission_id) DO UPDATE SET
                is_granted = EXCLUDED.is_granted,
                reason = EXCLUDED.reason,
                granted_by = EXCLUDED.granted_by,
                granted_at = EXCLUDED.granted_at
            RETURNING *
            "#,
        )
        .bind(department_id.get())
        .bind(permission.id.get())
        .bind(request.is_granted)
        .bind(&request.reason)
        .bind(granted_by.map(|id| id.get()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_department_grant", e))?;
        commit(tx).await?;
        Ok(row.into_inner())
    }

    #[instrument(skip(self), err)]
    async fn department_grants(
        &self,
        department_id: DepartmentId,
    ) -> StoreResult<Vec<DepartmentPermission>> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "departments", department_id.get(), "department").await?;
        let rows = sqlx::query_as::<_, Db<DepartmentPermission>>(
            "SELECT * FROM department_permissions WHERE department_id = $1 ORDER BY permission_id",
        )
        .bind(department_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("department_grants", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }

    /// One round trip: the user's role link and override row for the named permission.
    #[instrument(skip(self), err)]
    async fn permission_facts(
        &self,
        user_id: UserId,
        permission: &str,
    ) -> StoreResult<PermissionFacts> {
        let row: Option<(bool, bool, Option<bool>, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT
                p.is_active,
                EXISTS (
                    SELECT 1 FROM role_permissions rp
                    WHERE rp.role_id = u.role_id AND rp.permission_id = p.id
                ) AS role_linked,
                up.is_granted,
                up.expires_at
            FROM users u
            CROSS JOIN permissions p
            LEFT JOIN user_permissions up ON up.user_id = u.id AND up.permission_id = p.id
            WHERE u.id = $1 AND p.name = $2
            "#,
        )
        .bind(user_id.get())
        .bind(permission.trim().to_lowercase())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_facts", e))?;

        let Some((is_active, role_linked, is_granted, expires_at)) = row else {
            // Unknown user or unknown permission.
            let mut conn = self.acquire().await?;
            ensure_exists(&mut conn, "users", user_id.get(), "user").await?;
            return Ok(PermissionFacts::default());
        };

        Ok(PermissionFacts {
            role_grant: is_active && role_linked,
            user_override: is_granted.map(|is_granted| OverrideFact {
                is_granted,
                permission_active: is_active,
                expires_at,
            }),
        })
    }
}
