//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-connection client session.

use crate::adapters::{PgDocumentStore, PgIdentity};
use crate::config::Config;
use crate::error::ApiError;
use job_board_core::connectivity::{ConnectivityBanner, ConnectivityMonitor};
use job_board_core::data_access::DataAccessFacade;
use job_board_core::memory::{InMemoryAccounts, InMemoryDocumentStore, InMemoryIdentity};
use job_board_core::ports::{DocumentStore, IdentityProvider};
use job_board_core::session::SessionManager;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// Where identity clients get their accounts from.
#[derive(Clone)]
pub enum IdentityBackend {
    Postgres(PgPool),
    Memory(Arc<InMemoryAccounts>),
}

impl IdentityBackend {
    /// A fresh identity client with nobody signed in.
    pub fn client(&self) -> Arc<dyn IdentityProvider> {
        match self {
            IdentityBackend::Postgres(pool) => Arc::new(PgIdentity::new(pool.clone())),
            IdentityBackend::Memory(accounts) => Arc::new(InMemoryIdentity::new(accounts.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IdentityBackend::Postgres(_) => "postgres",
            IdentityBackend::Memory(_) => "memory",
        }
    }
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identity: IdentityBackend,
    pub connectivity: ConnectivityMonitor,
    pub config: Arc<Config>,
}

impl AppState {
    /// Connects the configured backend: Postgres when `DATABASE_URL` is set,
    /// otherwise the in-memory store (optionally seeded from `SEED_PATH`).
    pub async fn from_config(config: Arc<Config>) -> Result<Self, ApiError> {
        let (store, identity): (Arc<dyn DocumentStore>, IdentityBackend) =
            match &config.database_url {
                Some(url) => {
                    info!("Connecting to database...");
                    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
                    let store = PgDocumentStore::new(pool.clone());
                    info!("Running database migrations...");
                    store.run_migrations().await?;
                    info!("Database migrations complete.");
                    (Arc::new(store), IdentityBackend::Postgres(pool))
                }
                None => {
                    warn!("DATABASE_URL is not set; using the in-memory backend");
                    let store = match &config.seed_path {
                        Some(path) => {
                            info!("Seeding in-memory store from {}", path.display());
                            let raw = tokio::fs::read_to_string(path).await?;
                            InMemoryDocumentStore::from_seed(serde_json::from_str(&raw)?)?
                        }
                        None => InMemoryDocumentStore::new(),
                    };
                    (
                        Arc::new(store),
                        IdentityBackend::Memory(InMemoryAccounts::new()),
                    )
                }
            };

        Ok(Self {
            store,
            identity,
            connectivity: ConnectivityMonitor::new(None),
            config,
        })
    }
}

//=========================================================================================
// ClientSession (Specific to One WebSocket Connection)
//=========================================================================================

/// Everything one connected client owns: its own sign-in session, its own
/// data-access facade and its own view of the connection banner.
pub struct ClientSession {
    pub session: SessionManager,
    pub facade: Arc<DataAccessFacade>,
    pub banner: ConnectivityBanner,
}

impl ClientSession {
    pub fn new(app_state: &AppState) -> Self {
        Self {
            session: SessionManager::start(app_state.identity.client(), app_state.store.clone()),
            facade: Arc::new(DataAccessFacade::new(
                app_state.store.clone(),
                app_state.connectivity.clone(),
            )),
            banner: ConnectivityBanner::spawn(
                app_state.connectivity.subscribe(),
                app_state.config.banner_linger,
            ),
        }
    }
}
