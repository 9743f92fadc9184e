//! Postgres backend.
//!
//! Each store operation runs in one transaction; derived columns
//! (`user_count`, `employee_count`, order totals, customer metrics) are
//! recomputed inside it before commit.
//!
//! ## Error mapping
//!
//! | sqlx error | code | StoreError |
//! |------------|------|------------|
//! | unique violation | `23505` | `Domain(Conflict)` with a per-constraint message |
//! | foreign key violation | `23503` | `Domain(Validation)` |
//! | check violation | `23514` | `Domain(Validation)` |
//! | other database error | any | `Database` |
//! | pool closed / timed out | n/a | `Unavailable` |
//! | anything else | n/a | `Database` |

mod access;
mod catalog;
mod departments;
mod identity;
mod rows;
mod sales;

use std::sync::Arc;

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::instrument;

use crate::config::DatabaseConfig;
use crate::store::{StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(config), fields(host = %config.host, db = %config.name), err)]
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPool::connect(&config.connection_url())
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Every statement is idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        tracing::info!("schema applied");
        Ok(())
    }

    async fn acquire(&self) -> StoreResult<sqlx::pool::PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn commit(tx: Transaction<'static, Postgres>) -> StoreResult<()> {
    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
}

/// Not found unless `table` has a row with this id.
async fn ensure_exists(
    conn: &mut PgConnection,
    table: &'static str,
    id: i64,
    what: &str,
) -> StoreResult<()> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
    let exists: bool = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("ensure_exists", e))?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::not_found(what))
    }
}

/// Message for a unique violation, keyed by the default constraint name.
fn conflict_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_key") => "email already exists",
        Some("organizations_name_key") => "organization already exists",
        Some("permissions_name_key") => "permission already exists",
        Some("roles_name_key") => "role name already exists",
        Some("departments_code_key") => "department code already exists",
        Some("product_categories_code_key") => "category code already exists",
        Some("suppliers_code_key") => "supplier code already exists",
        Some("products_sku_key") => "product sku already exists",
        Some("customers_email_key") => "customer email already exists",
        _ => "record already exists",
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::conflict(conflict_message(db_err.constraint())),
                Some("23503") => {
                    tracing::debug!(%msg, "foreign key violation");
                    StoreError::validation("referenced record does not exist")
                }
                Some("23514") => {
                    tracing::debug!(%msg, "check violation");
                    StoreError::validation("value violates a constraint")
                }
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Database(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}
