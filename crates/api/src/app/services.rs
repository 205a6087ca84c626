//! Store and workflow wiring shared by every handler.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use stockhold_infra::{
    CatalogService, InMemoryStore, InventoryStore, OrderService, PostgresStore,
    PurchaseOrchestrator, ReclaimScheduler, ReclaimSchedulerHandle, ReservationManager,
};

use crate::config::Config;

/// Store handle shared by all workflows.
pub type SharedStore = Arc<dyn InventoryStore>;

pub struct AppServices {
    pub store: SharedStore,
    pub catalog: CatalogService<SharedStore>,
    pub purchases: PurchaseOrchestrator<SharedStore>,
    pub reservations: Arc<ReservationManager<SharedStore>>,
    pub orders: OrderService<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            purchases: PurchaseOrchestrator::new(store.clone()),
            reservations: Arc::new(ReservationManager::new(store.clone())),
            orders: OrderService::new(store.clone()),
            store,
        }
    }

    /// Services over a fresh in-memory store (tests, local development).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Connect the configured store: Postgres when `DATABASE_URL` is set,
    /// in-memory otherwise.
    pub async fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let store: SharedStore = match cfg.database_url.as_deref() {
            Some(url) => {
                let pg = PostgresStore::connect(url, cfg.db_max_connections, cfg.lock_timeout())
                    .await
                    .context("failed to connect to Postgres")?;
                pg.migrate().await.context("failed to apply schema")?;
                info!(max_connections = cfg.db_max_connections, "using Postgres store");
                Arc::new(pg)
            }
            None => {
                info!("DATABASE_URL not set; using in-memory store");
                Arc::new(InMemoryStore::with_lock_timeout(cfg.lock_timeout()))
            }
        };
        Ok(Self::new(store))
    }

    /// Start the periodic reclamation loop, unless disabled by config.
    pub fn spawn_reclaimer(&self, cfg: &Config) -> Option<ReclaimSchedulerHandle> {
        let interval = cfg.reclaim_interval()?;
        Some(ReclaimScheduler::with_interval(interval).spawn(self.reservations.clone()))
    }
}
