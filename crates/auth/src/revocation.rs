//! Token revocation: per-user `token_version` plus a blacklist keyed by `jti`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ainventory_core::{DomainError, DomainResult, UserId};

use crate::claims::JwtClaims;
use crate::token::TokenError;

/// Whether the request path consults revocation data.
///
/// `Ignore` accepts any correctly signed, unexpired token even after a logout;
/// `Enforce` rejects blacklisted tokens and tokens carrying a stale version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationPolicy {
    #[default]
    Ignore,
    Enforce,
}

impl RevocationPolicy {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "enforce" => Ok(Self::Enforce),
            other => Err(DomainError::validation(format!(
                "unknown token revocation policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistedToken {
    pub jti: Uuid,
    pub user_id: UserId,
    pub reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl BlacklistedToken {
    pub fn for_claims(claims: &JwtClaims, reason: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            jti: claims.jti,
            user_id: claims.user_id,
            reason,
            expires_at: claims.expires_at().unwrap_or(now),
            created_at: now,
        }
    }

    /// Past `expires_at` the token is rejected on expiry alone, so the row can go.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Check revocation data for already-verified claims.
pub fn check_revocation(
    policy: RevocationPolicy,
    claims: &JwtClaims,
    current_version: i32,
    blacklisted: bool,
) -> Result<(), TokenError> {
    match policy {
        RevocationPolicy::Ignore => Ok(()),
        RevocationPolicy::Enforce => {
            if blacklisted || claims.token_version != current_version {
                Err(TokenError::Revoked)
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::TokenType;

    fn claims(version: i32) -> JwtClaims {
        let now = Utc::now().timestamp();
        JwtClaims {
            user_id: UserId::new(1),
            email: "a@b.co".into(),
            token_type: TokenType::Access,
            token_version: version,
            jti: Uuid::now_v7(),
            iat: now,
            exp: now + 60,
        }
    }

    #[test]
    fn ignore_accepts_stale_and_blacklisted_tokens() {
        assert!(check_revocation(RevocationPolicy::Ignore, &claims(0), 3, true).is_ok());
    }

    #[test]
    fn enforce_rejects_stale_versions() {
        assert_eq!(
            check_revocation(RevocationPolicy::Enforce, &claims(0), 1, false),
            Err(TokenError::Revoked)
        );
        assert!(check_revocation(RevocationPolicy::Enforce, &claims(1), 1, false).is_ok());
    }

    #[test]
    fn enforce_rejects_blacklisted_tokens() {
        assert_eq!(
            check_revocation(RevocationPolicy::Enforce, &claims(1), 1, true),
            Err(TokenError::Revoked)
        );
    }

    #[test]
    fn blacklist_entry_expires_with_its_token() {
        let entry = BlacklistedToken::for_claims(&claims(0), None, Utc::now());
        let exp = entry.expires_at;
        assert!(!entry.is_expired(exp - chrono::Duration::seconds(1)));
        assert!(entry.is_expired(exp));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!(RevocationPolicy::parse("Enforce").unwrap(), RevocationPolicy::Enforce);
        assert!(RevocationPolicy::parse("maybe").is_err());
    }
}
