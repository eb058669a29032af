//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::config::Config;
use crate::db;
use crate::models;
use crate::query::{EntityRegistry, PgStoreExecutor, QueryService};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap. Everything inside is
/// immutable after startup.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// Entity metadata registry, built once from the model catalog.
    registry: Arc<EntityRegistry>,

    /// Query engine entry point.
    query: Arc<QueryService>,
}

impl AppState {
    /// Initialize state: connect the pool, build the registry, wire the
    /// query service.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        let registry = Arc::new(models::build_registry());
        let store = Arc::new(PgStoreExecutor::new(db.clone()));
        let query = QueryService::new(registry.clone(), store);

        Ok(Self {
            inner: Arc::new(AppStateInner { db, registry, query }),
        })
    }

    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    pub fn query(&self) -> &QueryService {
        &self.inner.query
    }

    /// Check PostgreSQL connectivity.
    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }
}
