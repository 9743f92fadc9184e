use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use ainventory_auth::{BlacklistedToken, NewUser, User, UserStatus, normalize_email};
use ainventory_core::{RoleId, UserId};
use ainventory_org::{Organization, ValidOnboarding};

use super::departments::recount_department;
use super::rows::Db;
use super::{PostgresStore, commit, ensure_exists, map_sqlx_error};
use crate::store::{IdentityStore, StoreError, StoreResult, apply_onboarding_names};

/// Lock and load one user.
pub(super) async fn user_for_update(conn: &mut PgConnection, id: UserId) -> StoreResult<User> {
    sqlx::query_as::<_, Db<User>>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(id.get())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("user_for_update", e))?
        .map(Db::into_inner)
        .ok_or_else(|| StoreError::not_found("user"))
}

pub(super) async fn save_user(conn: &mut PgConnection, user: &User) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE users SET
            first_name = $2, last_name = $3, status = $4, email_verified = $5,
            verified_at = $6, role_id = $7, department_id = $8, account_locked = $9,
            failed_login_attempts = $10, token_version = $11, last_login_at = $12
        WHERE id = $1
        "#,
    )
    .bind(user.id.get())
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.status.as_str())
    .bind(user.email_verified)
    .bind(user.verified_at)
    .bind(user.role_id.map(|id| id.get()))
    .bind(user.department_id.map(|id| id.get()))
    .bind(user.account_locked)
    .bind(user.failed_login_attempts)
    .bind(user.token_version)
    .bind(user.last_login_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("save_user", e))?;
    Ok(())
}

/// Recompute `roles.user_count` from the users table.
pub(super) async fn recount_role(conn: &mut PgConnection, role_id: Option<RoleId>) -> StoreResult<()> {
    let Some(role_id) = role_id else {
        return Ok(());
    };
    sqlx::query(
        "UPDATE roles SET user_count = (SELECT COUNT(*) FROM users WHERE role_id = $1) WHERE id = $1",
    )
    .bind(role_id.get())
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("recount_role", e))?;
    Ok(())
}

pub(super) async fn ensure_role_exists(conn: &mut PgConnection, role_id: RoleId) -> StoreResult<()> {
    ensure_exists(conn, "roles", role_id.get(), "role").await
}

impl PostgresStore {
    /// Load-modify-save on one user inside a transaction.
    async fn update_user<T>(
        &self,
        id: UserId,
        change: impl FnOnce(&mut User) -> T + Send,
    ) -> StoreResult<(User, T)> {
        let mut tx = self.begin().await?;
        let mut user = user_for_update(&mut tx, id).await?;
        let out = change(&mut user);
        save_user(&mut tx, &user).await?;
        commit(tx).await?;
        Ok((user, out))
    }
}

#[async_trait]
impl IdentityStore for PostgresStore {
    #[instrument(skip(self, user), fields(email = %user.email), err)]
    async fn create_user(&self, mut user: NewUser) -> StoreResult<User> {
        user.email = normalize_email(&user.email);
        let mut tx = self.begin().await?;
        if let Some(role_id) = user.role_id {
            ensure_role_exists(&mut tx, role_id).await?;
        }

        let row = sqlx::query_as::<_, Db<User>>(
            r#"
            INSERT INTO users (first_name, last_name, email, password_hash, gender, role_id, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.gender.as_str())
        .bind(user.role_id.map(|id| id.get()))
        .bind(user.joined_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        recount_role(&mut tx, user.role_id).await?;
        commit(tx).await?;
        Ok(row.into_inner())
    }

    #[instrument(skip(self), err)]
    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        sqlx::query_as::<_, Db<User>>("SELECT * FROM users WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?
            .map(Db::into_inner)
            .ok_or_else(|| StoreError::not_found("user"))
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, Db<User>>("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        Ok(row.map(Db::into_inner))
    }

    #[instrument(skip(self), err)]
    async fn record_failed_login(&self, id: UserId, max_attempts: i32) -> StoreResult<User> {
        let (user, locked) = self
            .update_user(id, |user| user.register_failed_login(max_attempts))
            .await?;
        if locked {
            tracing::warn!(user_id = %id, "account locked after repeated failed sign-ins");
        }
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn record_successful_login(&self, id: UserId, now: DateTime<Utc>) -> StoreResult<User> {
        let (user, ()) = self
            .update_user(id, |user| user.register_successful_login(now))
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn unlock_user(&self, id: UserId) -> StoreResult<User> {
        let (user, ()) = self.update_user(id, User::unlock).await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn set_user_status(&self, id: UserId, status: UserStatus) -> StoreResult<User> {
        let mut tx = self.begin().await?;
        let mut user = user_for_update(&mut tx, id).await?;
        user.status = status;
        save_user(&mut tx, &user).await?;
        recount_department(&mut tx, user.department_id).await?;
        commit(tx).await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn bump_token_version(&self, id: UserId) -> StoreResult<i32> {
        let (_, version) = self.update_user(id, User::bump_token_version).await?;
        Ok(version)
    }

    #[instrument(skip(self, token), fields(jti = %token.jti), err)]
    async fn blacklist_token(&self, token: BlacklistedToken) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let pruned = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= $1")
            .bind(token.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("prune_blacklist", e))?
            .rows_affected();
        if pruned > 0 {
            tracing::debug!(pruned, "expired blacklist entries removed");
        }

        sqlx::query(
            r#"
            INSERT INTO token_blacklist (jti, user_id, reason, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(token.jti)
        .bind(token.user_id.get())
        .bind(&token.reason)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("blacklist_token", e))?;
        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn is_token_blacklisted(&self, jti: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM token_blacklist WHERE jti = $1 AND expires_at > NOW())",
        )
        .bind(jti)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("is_token_blacklisted", e))
    }

    #[instrument(skip(self, onboarding), err)]
    async fn onboard(
        &self,
        user_id: UserId,
        onboarding: ValidOnboarding,
    ) -> StoreResult<Organization> {
        let mut tx = self.begin().await?;
        let mut user = user_for_update(&mut tx, user_id).await?;
        apply_onboarding_names(&mut user, &onboarding)?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM organizations WHERE LOWER(name) = LOWER($1))",
        )
        .bind(&onboarding.organization.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("onboard", e))?;
        if taken {
            return Err(StoreError::conflict("organization already exists"));
        }

        let org = &onboarding.organization;
        let row = sqlx::query_as::<_, Db<Organization>>(
            r#"
            INSERT INTO organizations (name, address, city, state, zip_code, country, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&org.name)
        .bind(&org.address)
        .bind(&org.city)
        .bind(&org.state)
        .bind(&org.zip_code)
        .bind(&org.country)
        .bind(user_id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("onboard", e))?;

        save_user(&mut tx, &user).await?;
        commit(tx).await?;
        Ok(row.into_inner())
    }

    #[instrument(skip(self), err)]
    async fn organizations_owned_by(&self, user_id: UserId) -> StoreResult<Vec<Organization>> {
        let rows = sqlx::query_as::<_, Db<Organization>>(
            "SELECT * FROM organizations WHERE owner_id = $1 ORDER BY id",
        )
        .bind(user_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("organizations_owned_by", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }
}
