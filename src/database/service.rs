//! Database service layer
//!
//! This module provides a single handle over the storage traits, backed either
//! by Postgres repositories or by the in-memory store.

use std::sync::Arc;
use crate::config::{Settings, StorageBackend};
use crate::database::connection::{create_pool, run_migrations, DatabasePool, PoolConfig};
use crate::database::memory::InMemoryStore;
use crate::database::repositories::{ArchiveRepository, BookingRepository, EventRepository};
use crate::database::store::{ArchiveStore, BookingStore, InventoryStore};
use crate::utils::errors::Result;

#[derive(Clone)]
pub struct DatabaseService {
    pub events: Arc<dyn InventoryStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub archives: Arc<dyn ArchiveStore>,
}

impl DatabaseService {
    /// Postgres-backed service
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            events: Arc::new(EventRepository::new(pool.clone())),
            bookings: Arc::new(BookingRepository::new(pool.clone())),
            archives: Arc::new(ArchiveRepository::new(pool)),
        }
    }

    /// Service over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(InMemoryStore::new()))
    }

    /// Service over a shared in-memory store, so callers keep a handle for fault injection
    pub fn from_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            events: store.clone(),
            bookings: store.clone(),
            archives: store,
        }
    }

    /// Connect to the configured backend, running migrations for Postgres
    pub async fn connect(settings: &Settings) -> Result<Self> {
        match settings.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data will not survive a restart");
                Ok(Self::in_memory())
            }
            StorageBackend::Postgres => {
                let pool = create_pool(&PoolConfig::from(&settings.database)).await?;
                run_migrations(&pool).await?;
                Ok(Self::postgres(pool))
            }
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        self.events.health_check().await
    }
}
