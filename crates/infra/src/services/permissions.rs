use std::sync::Arc;

use chrono::{DateTime, Utc};

use ainventory_auth::{
    AuthorizationExplanation, AuthzError, Decision, DenialKind, PermissionName, authorize,
    evaluate, explain,
};
use ainventory_core::UserId;

use crate::store::Backoffice;

/// Answers "may this user do that?" against the store.
///
/// Store failures never reach the caller: they are logged and the check is
/// denied.
#[derive(Clone)]
pub struct PermissionEvaluator {
    store: Arc<dyn Backoffice>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn Backoffice>) -> Self {
        Self { store }
    }

    pub async fn decide(
        &self,
        user_id: UserId,
        permission: &PermissionName,
        now: DateTime<Utc>,
    ) -> Decision {
        match self.store.permission_facts(user_id, permission.as_str()).await {
            Ok(facts) => evaluate(&facts, now),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    permission = permission.as_str(),
                    error = %e,
                    "permission lookup failed; denying"
                );
                Decision::Denied(DenialKind::LookupFailed)
            }
        }
    }

    pub async fn has_permission(&self, user_id: UserId, permission: &str) -> bool {
        let permission = PermissionName::new(permission.to_string());
        self.decide(user_id, &permission, Utc::now()).await.is_granted()
    }

    pub async fn require(
        &self,
        user_id: UserId,
        permission: &PermissionName,
    ) -> Result<(), AuthzError> {
        authorize(permission, self.decide(user_id, permission, Utc::now()).await)
    }

    pub async fn explain(
        &self,
        user_id: UserId,
        permission: &PermissionName,
    ) -> AuthorizationExplanation {
        explain(permission, self.decide(user_id, permission, Utc::now()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ainventory_auth::{Gender, NewPermission, NewRole, NewUser, OverrideRequest};
    use chrono::Duration;

    use crate::memory::InMemoryStore;
    use crate::store::{AccessStore, IdentityStore};

    async fn setup() -> (Arc<InMemoryStore>, PermissionEvaluator, UserId) {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_permission(NewPermission {
                name: "reports.view".into(),
                display_name: "View Reports".into(),
                description: String::new(),
                module: "reports".into(),
                action: "view".into(),
                resource: None,
                is_active: true,
            })
            .await
            .unwrap();
        let user = store
            .create_user(NewUser {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@example.com".into(),
                password_hash: String::new(),
                gender: Gender::Female,
                role_id: None,
                joined_at: Utc::now(),
            })
            .await
            .unwrap();
        let evaluator = PermissionEvaluator::new(store.clone());
        (store, evaluator, user.id)
    }

    fn override_request(is_granted: bool, expires_at: Option<DateTime<Utc>>) -> OverrideRequest {
        OverrideRequest {
            permission: "reports.view".into(),
            is_granted,
            expires_at,
            reason: None,
        }
    }

    #[tokio::test]
    async fn no_role_and_no_override_is_denied() {
        let (_, evaluator, user) = setup().await;
        assert!(!evaluator.has_permission(user, "reports.view").await);
    }

    #[tokio::test]
    async fn role_grant_allows() {
        let (store, evaluator, user) = setup().await;
        let role = store
            .create_role(
                NewRole {
                    name: "analyst".into(),
                    display_name: "Analyst".into(),
                    description: String::new(),
                    level: 1,
                    color: "blue".into(),
                    is_default: false,
                    is_active: true,
                },
                false,
                None,
            )
            .await
            .unwrap();
        store.grant_role_permission(role.id, "reports.view", None).await.unwrap();
        store.assign_role(user, Some(role.id)).await.unwrap();

        assert!(evaluator.has_permission(user, "reports.view").await);
        let why = evaluator.explain(user, &PermissionName::new("reports.view")).await;
        assert!(why.granted);
    }

    #[tokio::test]
    async fn override_grants_until_it_expires() {
        let (store, evaluator, user) = setup().await;
        let now = Utc::now();
        store
            .upsert_user_override(user, override_request(true, Some(now + Duration::hours(1))), None)
            .await
            .unwrap();
        let name = PermissionName::new("reports.view");

        assert!(evaluator.decide(user, &name, now).await.is_granted());
        assert_eq!(
            evaluator.decide(user, &name, now + Duration::hours(2)).await,
            Decision::Denied(DenialKind::OverrideExpired)
        );
    }

    #[tokio::test]
    async fn revoking_override_denies() {
        let (store, evaluator, user) = setup().await;
        store
            .upsert_user_override(user, override_request(false, None), None)
            .await
            .unwrap();
        assert!(!evaluator.has_permission(user, "reports.view").await);
    }

    #[tokio::test]
    async fn unknown_user_fails_closed() {
        let (_, evaluator, _) = setup().await;
        let decision = evaluator
            .decide(UserId::new(999), &PermissionName::new("reports.view"), Utc::now())
            .await;
        assert_eq!(decision, Decision::Denied(DenialKind::LookupFailed));
        assert!(
            evaluator
                .require(UserId::new(999), &PermissionName::new("reports.view"))
                .await
                .is_err()
        );
    }
}
