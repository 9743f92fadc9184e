use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::instrument;

use ainventory_auth::User;
use ainventory_core::{DepartmentId, UserId};
use ainventory_org::{Department, HierarchyEdge, NewDepartment, generate_code};

use super::identity::{save_user, user_for_update};
use super::rows::Db;
use super::{PostgresStore, commit, ensure_exists, map_sqlx_error};
use crate::store::{DepartmentStore, StoreError, StoreResult};

/// `employee_count` is the number of active users in the department.
pub(super) async fn recount_department(
    conn: &mut PgConnection,
    id: Option<DepartmentId>,
) -> StoreResult<()> {
    let Some(id) = id else {
        return Ok(());
    };
    sqlx::query(
        r#"
        UPDATE departments
        SET employee_count = (
            SELECT COUNT(*) FROM users WHERE department_id = $1 AND status = 'active'
        )
        WHERE id = $1
        "#,
    )
    .bind(id.get())
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("recount_department", e))?;
    Ok(())
}

fn into_departments(rows: Vec<Db<Department>>) -> Vec<Department> {
    rows.into_iter().map(Db::into_inner).collect()
}

#[async_trait]
impl DepartmentStore for PostgresStore {
    #[instrument(skip(self, input), fields(name = %input.name), err)]
    async fn create_department(
        &self,
        input: NewDepartment,
        created_by: Option<UserId>,
    ) -> StoreResult<Department> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;

        if let Some(parent_id) = input.parent_id {
            ensure_exists(&mut tx, "departments", parent_id.get(), "department")
                .await
                .map_err(|e| {
                    if e.is_not_found() {
                        StoreError::validation("parent department does not exist")
                    } else {
                        e
                    }
                })?;
        }
        if let Some(manager_id) = input.manager_id {
            ensure_exists(&mut tx, "users", manager_id.get(), "user")
                .await
                .map_err(|e| {
                    if e.is_not_found() {
                        StoreError::validation("manager does not exist")
                    } else {
                        e
                    }
                })?;
        }

        // Serialize code generation between concurrent creates.
        sqlx::query("LOCK TABLE departments IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_department", e))?;
        let taken: HashSet<String> = sqlx::query_scalar::<_, String>("SELECT code FROM departments")
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_department", e))?
            .into_iter()
            .collect();
        let code = match &input.code {
            Some(code) if taken.contains(code) => {
                return Err(StoreError::conflict("department code already exists"));
            }
            Some(code) => code.clone(),
            None => generate_code(&input.name, |candidate| taken.contains(candidate)),
        };

        let department = sqlx::query_as::<_, Db<Department>>(
            r#"
            INSERT INTO departments (name, code, description, parent_id, manager_id, location, is_active, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&code)
        .bind(&input.description)
        .bind(input.parent_id.map(|id| id.get()))
        .bind(input.manager_id.map(|id| id.get()))
        .bind(&input.location)
        .bind(input.is_active)
        .bind(created_by.map(|id| id.get()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_department", e))?
        .into_inner();

        // Self edge, then every ancestor of the parent one level deeper.
        sqlx::query(
            r#"
            INSERT INTO department_hierarchy (ancestor_id, descendant_id, depth)
            SELECT $1, $1, 0
            UNION ALL
            SELECT ancestor_id, $1, depth + 1
            FROM department_hierarchy
            WHERE descendant_id = $2
            "#,
        )
        .bind(department.id.get())
        .bind(input.parent_id.map(|id| id.get()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_department", e))?;

        commit(tx).await?;
        tracing::info!(department_id = %department.id, code = %department.code, "department created");
        Ok(department)
    }

    #[instrument(skip(self), err)]
    async fn get_department(&self, id: DepartmentId) -> StoreResult<Department> {
        sqlx::query_as::<_, Db<Department>>("SELECT * FROM departments WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_department", e))?
            .map(Db::into_inner)
            .ok_or_else(|| StoreError::not_found("department"))
    }

    #[instrument(skip(self), err)]
    async fn list_departments(&self) -> StoreResult<Vec<Department>> {
        let rows = sqlx::query_as::<_, Db<Department>>("SELECT * FROM departments ORDER BY name")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_departments", e))?;
        Ok(into_departments(rows))
    }

    #[instrument(skip(self), err)]
    async fn child_departments(&self, id: DepartmentId) -> StoreResult<Vec<Department>> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "departments", id.get(), "department").await?;
        let rows = sqlx::query_as::<_, Db<Department>>(
            "SELECT * FROM departments WHERE parent_id = $1 ORDER BY name",
        )
        .bind(id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("child_departments", e))?;
        Ok(into_departments(rows))
    }

    #[instrument(skip(self), err)]
    async fn ancestors(&self, id: DepartmentId) -> StoreResult<Vec<Department>> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "departments", id.get(), "department").await?;
        let rows = sqlx::query_as::<_, Db<Department>>(
            r#"
            SELECT d.* FROM departments d
            JOIN department_hierarchy h ON h.ancestor_id = d.id
            WHERE h.descendant_id = $1 AND h.depth > 0
            ORDER BY h.depth DESC, d.id
            "#,
        )
        .bind(id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("ancestors", e))?;
        Ok(into_departments(rows))
    }

    #[instrument(skip(self), err)]
    async fn descendants(&self, id: DepartmentId) -> StoreResult<Vec<Department>> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "departments", id.get(), "department").await?;
        let rows = sqlx::query_as::<_, Db<Department>>(
            r#"
            SELECT d.* FROM departments d
            JOIN department_hierarchy h ON h.descendant_id = d.id
            WHERE h.ancestor_id = $1 AND h.depth > 0
            ORDER BY h.depth, d.id
            "#,
        )
        .bind(id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("descendants", e))?;
        Ok(into_departments(rows))
    }

    #[instrument(skip(self), err)]
    async fn is_ancestor_of(
        &self,
        ancestor: DepartmentId,
        descendant: DepartmentId,
    ) -> StoreResult<bool> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "departments", ancestor.get(), "department").await?;
        ensure_exists(&mut conn, "departments", descendant.get(), "department").await?;
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM department_hierarchy
                WHERE ancestor_id = $1 AND descendant_id = $2 AND depth > 0
            )
            "#,
        )
        .bind(ancestor.get())
        .bind(descendant.get())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("is_ancestor_of", e))
    }

    #[instrument(skip(self), err)]
    async fn closure_rows_for(&self, id: DepartmentId) -> StoreResult<Vec<HierarchyEdge>> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "departments", id.get(), "department").await?;
        let rows = sqlx::query_as::<_, Db<HierarchyEdge>>(
            "SELECT * FROM department_hierarchy WHERE descendant_id = $1 ORDER BY depth",
        )
        .bind(id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("closure_rows_for", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }

    #[instrument(skip(self), err)]
    async fn delete_department(&self, id: DepartmentId) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let department = sqlx::query_as::<_, Db<Department>>(
            "SELECT * FROM departments WHERE id = $1 FOR UPDATE",
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_department", e))?
        .map(Db::into_inner)
        .ok_or_else(|| StoreError::not_found("department"))?;

        let (active_users, children): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE department_id = $1 AND status = 'active'),
                (SELECT COUNT(*) FROM departments WHERE parent_id = $1)
            "#,
        )
        .bind(id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_department", e))?;
        department.ensure_deletable(active_users, children)?;

        for sql in [
            "DELETE FROM department_hierarchy WHERE ancestor_id = $1 OR descendant_id = $1",
            "DELETE FROM department_permissions WHERE department_id = $1",
            "UPDATE users SET department_id = NULL WHERE department_id = $1",
            "DELETE FROM departments WHERE id = $1",
        ] {
            sqlx::query(sql)
                .bind(id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_department", e))?;
        }
        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn assign_user_department(
        &self,
        user_id: UserId,
        department_id: Option<DepartmentId>,
    ) -> StoreResult<User> {
        let mut tx = self.begin().await?;
        if let Some(department_id) = department_id {
            ensure_exists(&mut tx, "departments", department_id.get(), "department").await?;
        }
        let mut user = user_for_update(&mut tx, user_id).await?;
        let previous = std::mem::replace(&mut user.department_id, department_id);
        save_user(&mut tx, &user).await?;
        recount_department(&mut tx, previous).await?;
        recount_department(&mut tx, department_id).await?;
        commit(tx).await?;
        Ok(user)
    }
}
