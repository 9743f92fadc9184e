use std::sync::Arc;

use anyhow::Context;

use ainventory_infra::{
    AppConfig, AuthService, Backoffice, InMemoryStore, PermissionEvaluator, PostgresStore,
    StorageBackend, seed_defaults,
};

/// Everything a handler needs, shared behind one `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn Backoffice>,
    pub auth: AuthService,
    pub permissions: PermissionEvaluator,
    pub storage: StorageBackend,
}

impl AppServices {
    pub fn new(store: Arc<dyn Backoffice>, config: &AppConfig) -> Self {
        Self {
            auth: AuthService::new(store.clone(), config),
            permissions: PermissionEvaluator::new(store.clone()),
            store,
            storage: config.storage,
        }
    }
}

/// Open the configured backend, apply the schema and seed defaults.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn Backoffice> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("postgres storage selected without database settings")?;
            let store = PostgresStore::connect(database)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to apply schema")?;
            Arc::new(store)
        }
    };

    if config.seed_defaults {
        seed_defaults(store.as_ref())
            .await
            .context("failed to seed default data")?;
    }

    tracing::info!(storage = config.storage.as_str(), "services ready");
    Ok(AppServices::new(store, config))
}
