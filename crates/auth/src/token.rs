//! HS256 token issuing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use thiserror::Error;
use uuid::Uuid;

use crate::claims::{JwtClaims, TokenType, TokenValidationError, validate_claims};
use crate::user::User;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("unexpected signing method")]
    WrongAlgorithm,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("token has been revoked")]
    Revoked,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: JwtClaims,
}

/// Signs and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(
        &self,
        user: &User,
        token_type: TokenType,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let claims = JwtClaims {
            user_id: user.id,
            email: user.email.clone(),
            token_type,
            token_version: user.token_version,
            jti: Uuid::now_v7(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify signature and algorithm, then the claims against `now`.
    pub fn validate(
        &self,
        token: &str,
        expected: TokenType,
        now: DateTime<Utc>,
    ) -> Result<JwtClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => TokenError::WrongAlgorithm,
                _ => TokenError::Invalid(e.to_string()),
            })?;

        validate_claims(&data.claims, expected, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{Gender, NewUser};
    use ainventory_core::UserId;

    fn user() -> User {
        NewUser {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            email: "grace@example.com".into(),
            password_hash: String::new(),
            gender: Gender::Female,
            role_id: None,
            joined_at: Utc::now(),
        }
        .into_user(UserId::new(7))
    }

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(secret.as_bytes(), Duration::hours(24))
    }

    #[test]
    fn issued_token_round_trips() {
        let now = Utc::now();
        let issued = issuer("s3cret").issue(&user(), TokenType::Access, now).unwrap();
        let claims = issuer("s3cret")
            .validate(&issued.token, TokenType::Access, now)
            .unwrap();
        assert_eq!(claims.user_id, UserId::new(7));
        assert_eq!(claims.email, "grace@example.com");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn other_secret_fails_signature_check() {
        let now = Utc::now();
        let issued = issuer("one").issue(&user(), TokenType::Access, now).unwrap();
        assert_eq!(
            issuer("two").validate(&issued.token, TokenType::Access, now).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    #[test]
    fn other_algorithm_is_rejected() {
        let now = Utc::now();
        let issued = issuer("s3cret").issue(&user(), TokenType::Access, now).unwrap();
        let forged = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &issued.claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();
        assert_eq!(
            issuer("s3cret").validate(&forged, TokenType::Access, now).unwrap_err(),
            TokenError::WrongAlgorithm
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued_at = Utc::now() - Duration::hours(48);
        let issued = issuer("s3cret").issue(&user(), TokenType::Access, issued_at).unwrap();
        assert_eq!(
            issuer("s3cret")
                .validate(&issued.token, TokenType::Access, Utc::now())
                .unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            issuer("s3cret").validate("not.a.jwt", TokenType::Access, Utc::now()),
            Err(TokenError::Invalid(_))
        ));
    }
}
