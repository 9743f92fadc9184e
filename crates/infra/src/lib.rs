//! Infrastructure layer: storage backends, configuration, seeding and the
//! services the HTTP layer calls into.

pub mod config;
pub mod memory;
pub mod postgres;
pub mod seed;
pub mod services;
pub mod store;

pub use config::{AppConfig, ConfigError, DatabaseConfig, StorageBackend};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use seed::{SeedReport, seed_defaults};
pub use services::{AuthError, AuthService, PermissionEvaluator, SignedIn};
pub use store::{
    AccessStore, Backoffice, CatalogStore, DepartmentStore, IdentityStore, SalesStore, StoreError,
    StoreResult,
};
