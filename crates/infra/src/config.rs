//! Process configuration, read once from the environment at startup.

use std::collections::HashMap;

use ainventory_auth::RevocationPolicy;
use thiserror::Error;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} must be set when STORAGE_BACKEND=postgres")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres => "postgres",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl core::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub database: Option<DatabaseConfig>,
    pub storage: StorageBackend,
    pub bind_addr: String,
    pub revocation: RevocationPolicy,
    pub max_failed_logins: i32,
    pub seed_defaults: bool,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("database", &self.database)
            .field("storage", &self.storage)
            .field("bind_addr", &self.bind_addr)
            .field("revocation", &self.revocation)
            .field("max_failed_logins", &self.max_failed_logins)
            .field("seed_defaults", &self.seed_defaults)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// In-memory configuration used by tests and local runs.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl_hours: 24,
            database: None,
            storage: StorageBackend::Memory,
            bind_addr: "0.0.0.0:8080".to_string(),
            revocation: RevocationPolicy::Ignore,
            max_failed_logins: 5,
            seed_defaults: true,
        }
    }

    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let token_ttl_hours = parse_or("TOKEN_TTL_HOURS", get("TOKEN_TTL_HOURS"), 24i64)?;
        if token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "TOKEN_TTL_HOURS",
                reason: "must be positive".to_string(),
            });
        }

        let database = match get("DB_HOST") {
            Some(host) => Some(DatabaseConfig {
                host,
                port: parse_or("DB_PORT", get("DB_PORT"), 5432u16)?,
                user: get("DB_USER").ok_or(ConfigError::Missing("DB_USER"))?,
                password: get("DB_PASSWORD").unwrap_or_default(),
                name: get("DB_NAME").ok_or(ConfigError::Missing("DB_NAME"))?,
            }),
            None => None,
        };

        let storage = match get("STORAGE_BACKEND").as_deref() {
            None if database.is_some() => StorageBackend::Postgres,
            None | Some("memory") => StorageBackend::Memory,
            Some("postgres") => StorageBackend::Postgres,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND",
                    reason: format!("expected memory or postgres, got '{other}'"),
                });
            }
        };
        if storage == StorageBackend::Postgres && database.is_none() {
            return Err(ConfigError::Missing("DB_HOST"));
        }

        let revocation = match get("TOKEN_REVOCATION") {
            Some(raw) => RevocationPolicy::parse(&raw).map_err(|e| ConfigError::Invalid {
                key: "TOKEN_REVOCATION",
                reason: e.to_string(),
            })?,
            None => RevocationPolicy::Ignore,
        };

        Ok(Self {
            jwt_secret,
            token_ttl_hours,
            database,
            storage,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            revocation,
            max_failed_logins: parse_or("MAX_FAILED_LOGINS", get("MAX_FAILED_LOGINS"), 5i32)?,
            seed_defaults: parse_bool("SEED_DEFAULTS", get("SEED_DEFAULTS"), true)?,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
