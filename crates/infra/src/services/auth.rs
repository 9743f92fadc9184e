use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use ainventory_auth::{
    BlacklistedToken, IssuedToken, JwtClaims, NewUser, PasswordHashError, RevocationPolicy,
    SignIn, SignUp, TokenError, TokenIssuer, TokenType, User, check_revocation, hash_password,
    verify_password,
};
use ainventory_core::UserId;

use crate::config::AppConfig;
use crate::store::{Backoffice, StoreError};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password; the two are not told apart.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is not allowed to login")]
    NotAllowed,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Hash(#[from] PasswordHashError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub token: IssuedToken,
}

/// Sign-up, sign-in and token lifecycle.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Backoffice>,
    tokens: TokenIssuer,
    revocation: RevocationPolicy,
    max_failed_logins: i32,
}

impl AuthService {
    pub fn new(store: Arc<dyn Backoffice>, config: &AppConfig) -> Self {
        Self {
            store,
            tokens: TokenIssuer::new(
                config.jwt_secret.as_bytes(),
                Duration::hours(config.token_ttl_hours),
            ),
            revocation: config.revocation,
            max_failed_logins: config.max_failed_logins,
        }
    }

    /// Register a new account. New accounts get the default role when one exists.
    pub async fn sign_up(&self, input: SignUp) -> Result<User, AuthError> {
        let valid = input.validate().map_err(StoreError::from)?;
        if self.store.find_user_by_email(&valid.email).await?.is_some() {
            return Err(StoreError::conflict("email already exists").into());
        }

        let password_hash = hash_password(&valid.password)?;
        let mut user = NewUser::from_sign_up(valid, password_hash, Utc::now());
        user.role_id = self.store.default_role().await?.map(|role| role.id);

        let user = self.store.create_user(user).await?;
        tracing::info!(user_id = %user.id, "user signed up");
        Ok(user)
    }

    pub async fn sign_in(&self, input: SignIn) -> Result<SignedIn, AuthError> {
        let email = input.validate().map_err(StoreError::from)?;
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(&input.password, &user.password_hash) {
            self.store
                .record_failed_login(user.id, self.max_failed_logins)
                .await?;
            return Err(AuthError::InvalidCredentials);
        }
        if !user.can_login() {
            return Err(AuthError::NotAllowed);
        }

        let now = Utc::now();
        let user = self.store.record_successful_login(user.id, now).await?;
        let token = self.tokens.issue(&user, TokenType::Access, now)?;
        tracing::debug!(user_id = %user.id, jti = %token.claims.jti, "token issued");
        Ok(SignedIn { user, token })
    }

    /// Verify a bearer token and load its user.
    ///
    /// Blacklist and token version are only consulted under
    /// [`RevocationPolicy::Enforce`].
    pub async fn authenticate(&self, token: &str) -> Result<(User, JwtClaims), AuthError> {
        let claims = self.tokens.validate(token, TokenType::Access, Utc::now())?;
        let user = match self.store.get_user(claims.user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                return Err(TokenError::Invalid("unknown user".into()).into());
            }
            Err(e) => return Err(e.into()),
        };
        if !user.is_active() {
            return Err(AuthError::NotAllowed);
        }

        if self.revocation == RevocationPolicy::Enforce {
            let blacklisted = self.store.is_token_blacklisted(claims.jti).await?;
            check_revocation(self.revocation, &claims, user.token_version, blacklisted)?;
        }
        Ok((user, claims))
    }

    /// Revoke the presented token.
    pub async fn logout(&self, claims: &JwtClaims) -> Result<(), AuthError> {
        let entry = BlacklistedToken::for_claims(claims, Some("logout".into()), Utc::now());
        self.store.blacklist_token(entry).await?;
        Ok(())
    }

    /// Revoke every token issued to the user so far.
    pub async fn logout_all(&self, user_id: UserId) -> Result<i32, AuthError> {
        let version = self.store.bump_token_version(user_id).await?;
        tracing::info!(user_id = %user_id, token_version = version, "all sessions revoked");
        Ok(version)
    }
}
