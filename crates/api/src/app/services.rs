//! Process-wide service wiring: ledger store, engine, change hub, token
//! verification.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use posledger_auth::{Hs256JwtValidator, JwtValidator};
use posledger_events::ChangeHub;
use posledger_infra::{
    ledger_store::{InMemoryLedgerStore, LedgerStore, StoreError},
    seed::{apply_seed, CatalogSeed, SeedError},
    EngineConfig, InvoiceEngine,
};

use crate::config::{AppConfig, DashboardSettings};

pub type SharedStore = Arc<dyn LedgerStore>;
pub type Engine = InvoiceEngine<SharedStore, ChangeHub>;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("cannot read seed file {path}: {source}")]
    SeedFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error("ledger store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AppServices {
    pub store: SharedStore,
    pub engine: Arc<Engine>,
    pub hub: ChangeHub,
    pub jwt: Arc<dyn JwtValidator>,
    pub dashboard: DashboardSettings,
}

impl AppServices {
    /// Wire services around an already opened store.
    pub fn new(store: SharedStore, config: &AppConfig) -> Self {
        let hub = ChangeHub::new(config.push_buffer);
        let engine = InvoiceEngine::with_config(
            Arc::clone(&store),
            hub.clone(),
            EngineConfig {
                max_conflict_retries: config.max_conflict_retries,
            },
        );
        Self {
            store,
            engine: Arc::new(engine),
            hub,
            jwt: Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes())),
            dashboard: config.dashboard,
        }
    }

    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), config)
    }
}

/// Open the configured store and apply the seed file, if any.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    let store = open_store(config).await?;
    let services = AppServices::new(store, config);

    if let Some(path) = &config.seed_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ServicesError::SeedFile {
                path: path.clone(),
                source,
            })?;
        let seed = CatalogSeed::from_json(&raw)?;
        apply_seed(services.store.as_ref(), &seed).await?;
    }

    Ok(services)
}

#[cfg(feature = "postgres")]
async fn open_store(config: &AppConfig) -> Result<SharedStore, ServicesError> {
    use posledger_infra::ledger_store::PostgresLedgerStore;

    match &config.database_url {
        Some(url) => {
            let store = PostgresLedgerStore::connect(url).await?;
            store.ensure_schema().await?;
            tracing::info!("using postgres ledger store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory ledger store");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &AppConfig) -> Result<SharedStore, ServicesError> {
    if config.database_url.is_some() {
        tracing::warn!(
            "DATABASE_URL is set but this build has no postgres support; using in-memory ledger store"
        );
    } else {
        tracing::info!("using in-memory ledger store");
    }
    Ok(Arc::new(InMemoryLedgerStore::new()))
}
