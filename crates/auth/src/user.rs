//! User identity, sign-up validation and login bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ainventory_core::{DepartmentId, DomainError, DomainResult, Entity, RoleId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// User is active and can authenticate.
    #[default]
    Active,
    /// User was deactivated by an administrator.
    Inactive,
    /// User is suspended and cannot authenticate.
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "suspended" => Ok(UserStatus::Suspended),
            other => Err(DomainError::validation(format!("unknown user status '{other}'"))),
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
    #[serde(rename = "Prefer not to say")]
    PreferNotToSay,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
            Gender::PreferNotToSay => "Prefer not to say",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw.trim() {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            "Prefer not to say" => Ok(Gender::PreferNotToSay),
            _ => Err(DomainError::validation(
                "gender must be one of: Male, Female, Other, Prefer not to say",
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A back-office user.
///
/// # Invariants
/// - `email` is stored lowercased and is unique across users.
/// - `token_version` only ever increases.
/// - A locked account cannot log in until an administrator unlocks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub employee_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub gender: Gender,
    pub is_superuser: bool,
    pub status: UserStatus,
    pub email_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub role_id: Option<RoleId>,
    pub department_id: Option<DepartmentId>,
    pub account_locked: bool,
    pub failed_login_attempts: i32,
    pub token_version: i32,
    pub joined_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Active, verified and not locked.
    pub fn can_login(&self) -> bool {
        self.status == UserStatus::Active && self.email_verified && !self.account_locked
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Count a wrong password; locks the account once `max_attempts` is reached.
    ///
    /// Returns `true` if this attempt locked the account.
    pub fn register_failed_login(&mut self, max_attempts: i32) -> bool {
        self.failed_login_attempts = self.failed_login_attempts.saturating_add(1);
        if max_attempts > 0 && self.failed_login_attempts >= max_attempts && !self.account_locked {
            self.account_locked = true;
            return true;
        }
        false
    }

    /// Clear a lockout and start the failed-attempt count over.
    pub fn unlock(&mut self) {
        self.account_locked = false;
        self.failed_login_attempts = 0;
    }

    pub fn register_successful_login(&mut self, now: DateTime<Utc>) {
        self.failed_login_attempts = 0;
        self.last_login_at = Some(now);
    }

    /// Invalidate every token issued so far ("logout all sessions").
    pub fn bump_token_version(&mut self) -> i32 {
        self.token_version = self.token_version.saturating_add(1);
        self.token_version
    }

    pub fn rename(&mut self, first_name: &str, last_name: &str) -> DomainResult<()> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        validate_name("first name", first_name)?;
        validate_name("last name", last_name)?;
        self.first_name = first_name.to_string();
        self.last_name = last_name.to_string();
        Ok(())
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sign-up / sign-in input
// ─────────────────────────────────────────────────────────────────────────────

pub const MIN_PASSWORD_LEN: usize = 8;

/// Lowercase and trim an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn validate_name(field: &str, value: &str) -> DomainResult<()> {
    let len = value.chars().count();
    if !(2..=50).contains(&len) {
        return Err(DomainError::validation(format!(
            "{field} must be between 2 and 50 characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUp {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub gender: String,
}

/// A validated sign-up with the password still in clear text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSignUp {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub gender: Gender,
}

impl SignUp {
    pub fn validate(self) -> DomainResult<ValidSignUp> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        validate_name("first name", &first_name)?;
        validate_name("last name", &last_name)?;

        let email = normalize_email(&self.email);
        if !is_valid_email(&email) {
            return Err(DomainError::validation("email is not valid"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        Ok(ValidSignUp {
            first_name,
            last_name,
            email,
            password: self.password,
            gender: Gender::parse(&self.gender)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignIn {
    pub email: String,
    pub password: String,
}

impl SignIn {
    /// Returns the normalized email.
    pub fn validate(&self) -> DomainResult<String> {
        let email = normalize_email(&self.email);
        if !is_valid_email(&email) || self.password.is_empty() {
            return Err(DomainError::validation("Invalid input"));
        }
        Ok(email)
    }
}

/// A user ready to be inserted (id assigned by the store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub gender: Gender,
    pub role_id: Option<RoleId>,
    pub joined_at: DateTime<Utc>,
}

impl NewUser {
    pub fn from_sign_up(sign_up: ValidSignUp, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            first_name: sign_up.first_name,
            last_name: sign_up.last_name,
            email: sign_up.email,
            password_hash,
            gender: sign_up.gender,
            role_id: None,
            joined_at: now,
        }
    }

    /// New users are active and verified at creation.
    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            employee_id: None,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            password_hash: self.password_hash,
            gender: self.gender,
            is_superuser: false,
            status: UserStatus::Active,
            email_verified: true,
            verified_at: Some(self.joined_at),
            role_id: self.role_id,
            department_id: None,
            account_locked: false,
            failed_login_attempts: 0,
            token_version: 0,
            joined_at: self.joined_at,
            last_login_at: None,
        }
    }
}
