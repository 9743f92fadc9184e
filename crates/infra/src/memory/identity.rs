use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ainventory_auth::{BlacklistedToken, NewUser, User, UserStatus, normalize_email};
use ainventory_core::UserId;
use ainventory_org::{Organization, ValidOnboarding};

use super::{InMemoryStore, upsert};
use crate::store::{IdentityStore, StoreError, StoreResult, apply_onboarding_names};

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn create_user(&self, mut user: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        user.email = normalize_email(&user.email);
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::conflict("email already exists"));
        }
        if let Some(role_id) = user.role_id {
            state.role(role_id)?;
        }

        let id = state.next_id("users");
        let user = user.into_user(id);
        upsert(&mut state.users, &user);
        if let Some(role_id) = user.role_id {
            let count = state.count_users_with_role(role_id);
            if let Some(role) = state.roles.get_mut(&role_id) {
                role.user_count = count;
            }
        }
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        let state = self.state.read().await;
        state.user(id).cloned()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn record_failed_login(&self, id: UserId, max_attempts: i32) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        if user.register_failed_login(max_attempts) {
            tracing::warn!(user_id = %id, "account locked after repeated failed sign-ins");
        }
        Ok(user.clone())
    }

    async fn record_successful_login(&self, id: UserId, now: DateTime<Utc>) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.register_successful_login(now);
        Ok(user.clone())
    }

    async fn unlock_user(&self, id: UserId) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.unlock();
        Ok(user.clone())
    }

    async fn set_user_status(&self, id: UserId, status: UserStatus) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let user = state.user_mut(id)?;
        user.status = status;
        let user = user.clone();
        state.recount_department(user.department_id);
        Ok(user)
    }

    async fn bump_token_version(&self, id: UserId) -> StoreResult<i32> {
        let mut state = self.state.write().await;
        Ok(state.user_mut(id)?.bump_token_version())
    }

    async fn blacklist_token(&self, token: BlacklistedToken) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.user(token.user_id)?;
        let now = token.created_at;
        state.blacklist.retain(|_, entry| !entry.is_expired(now));
        state.blacklist.entry(token.jti).or_insert(token);
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: Uuid) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .blacklist
            .get(&jti)
            .is_some_and(|entry| !entry.is_expired(Utc::now())))
    }

    async fn onboard(
        &self,
        user_id: UserId,
        onboarding: ValidOnboarding,
    ) -> StoreResult<Organization> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let mut user = state.user(user_id)?.clone();
        apply_onboarding_names(&mut user, &onboarding)?;
        if state
            .organizations
            .values()
            .any(|o| o.name.eq_ignore_ascii_case(&onboarding.organization.name))
        {
            return Err(StoreError::conflict("organization already exists"));
        }

        let id = state.next_id("organizations");
        let organization = onboarding.organization.into_organization(id, user_id, now);
        upsert(&mut state.organizations, &organization);
        state.users.insert(user_id, user);
        Ok(organization)
    }

    async fn organizations_owned_by(&self, user_id: UserId) -> StoreResult<Vec<Organization>> {
        let state = self.state.read().await;
        Ok(state
            .organizations
            .values()
            .filter(|o| o.owner_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ainventory_auth::Gender;
    use ainventory_org::Onboarding;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            email: email.into(),
            password_hash: "hash".into(),
            gender: Gender::Female,
            role_id: None,
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let store = InMemoryStore::new();
        store.create_user(new_user("grace@navy.mil")).await.unwrap();
        let err = store.create_user(new_user("Grace@Navy.MIL")).await.unwrap_err();
        assert_eq!(err.to_string(), "email already exists");
    }

    #[tokio::test]
    async fn lookup_by_email_ignores_case() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("grace@navy.mil")).await.unwrap();
        let found = store.find_user_by_email(" GRACE@navy.mil ").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn failed_logins_lock_the_account() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("grace@navy.mil")).await.unwrap();
        for _ in 0..2 {
            store.record_failed_login(user.id, 3).await.unwrap();
        }
        assert!(!store.get_user(user.id).await.unwrap().account_locked);
        let locked = store.record_failed_login(user.id, 3).await.unwrap();
        assert!(locked.account_locked);
        assert!(!locked.can_login());

        let reset = store.record_successful_login(user.id, Utc::now()).await.unwrap();
        assert_eq!(reset.failed_login_attempts, 0);
        assert!(reset.last_login_at.is_some());
    }

    #[tokio::test]
    async fn unlock_lets_a_locked_account_back_in() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("grace@navy.mil")).await.unwrap();
        for _ in 0..3 {
            store.record_failed_login(user.id, 3).await.unwrap();
        }
        assert!(!store.get_user(user.id).await.unwrap().can_login());

        let unlocked = store.unlock_user(user.id).await.unwrap();
        assert!(!unlocked.account_locked);
        assert_eq!(unlocked.failed_login_attempts, 0);
        assert!(unlocked.can_login());

        let err = store.unlock_user(UserId::new(99)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn status_change_is_persisted() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("grace@navy.mil")).await.unwrap();
        let suspended = store.set_user_status(user.id, UserStatus::Suspended).await.unwrap();
        assert!(!suspended.is_active());
        assert!(!suspended.can_login());
        assert_eq!(store.get_user(user.id).await.unwrap().status, UserStatus::Suspended);
    }

    fn blacklisted(
        user_id: UserId,
        created_at: DateTime<Utc>,
        ttl_minutes: i64,
    ) -> BlacklistedToken {
        BlacklistedToken {
            jti: Uuid::new_v4(),
            user_id,
            reason: Some("logout".into()),
            expires_at: created_at + chrono::Duration::minutes(ttl_minutes),
            created_at,
        }
    }

    #[tokio::test]
    async fn expired_blacklist_entries_are_pruned() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("grace@navy.mil")).await.unwrap();
        let earlier = Utc::now() - chrono::Duration::hours(2);

        let stale = blacklisted(user.id, earlier, 30);
        store.blacklist_token(stale.clone()).await.unwrap();
        assert!(!store.is_token_blacklisted(stale.jti).await.unwrap());

        let live = blacklisted(user.id, Utc::now(), 30);
        store.blacklist_token(live.clone()).await.unwrap();
        assert!(store.is_token_blacklisted(live.jti).await.unwrap());

        let state = store.state.read().await;
        assert_eq!(state.blacklist.len(), 1);
        assert!(state.blacklist.contains_key(&live.jti));
    }

    #[tokio::test]
    async fn token_version_only_grows() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("grace@navy.mil")).await.unwrap();
        assert_eq!(store.bump_token_version(user.id).await.unwrap(), 1);
        assert_eq!(store.bump_token_version(user.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn onboarding_renames_and_creates_an_owned_organization() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("grace@navy.mil")).await.unwrap();
        let onboarding = Onboarding {
            first_name: " Amazing ".into(),
            last_name: "Grace".into(),
            organization: "Harvard Mark I".into(),
            ..Onboarding::default()
        }
        .validate()
        .unwrap();

        let org = store.onboard(user.id, onboarding.clone()).await.unwrap();
        assert_eq!(org.owner_id, user.id);
        assert_eq!(org.country, "United States");
        assert_eq!(store.get_user(user.id).await.unwrap().first_name, "Amazing");
        assert_eq!(store.organizations_owned_by(user.id).await.unwrap().len(), 1);

        let err = store.onboard(user.id, onboarding).await.unwrap_err();
        assert_eq!(err.to_string(), "organization already exists");
    }

    #[tokio::test]
    async fn invalid_name_leaves_nothing_behind() {
        let store = InMemoryStore::new();
        let user = store.create_user(new_user("grace@navy.mil")).await.unwrap();
        let onboarding = Onboarding {
            first_name: "G".into(),
            organization: "Univac".into(),
            ..Onboarding::default()
        }
        .validate()
        .unwrap();

        assert!(store.onboard(user.id, onboarding).await.is_err());
        assert!(store.organizations_owned_by(user.id).await.unwrap().is_empty());
        assert_eq!(store.get_user(user.id).await.unwrap().first_name, "Grace");
    }
}
