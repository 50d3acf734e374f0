//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag). Also hosts the blob storage backends.

pub mod blob;
mod builder;
mod catalog;
mod convert;
mod entity;
mod errors;
mod migration;

mod admin_store;
mod billing_store;
mod engagement_store;
mod image_store;
mod payment_store;
mod plan_store;
mod subscription_store;
mod tenant_store;

use std::sync::Arc;

use picshare_domain::storage::StorageResult;
use sea_orm::{Database, DatabaseConnection};

pub use builder::StorageBuilder;
use catalog::seed_plan_catalog;
use errors::StorageError;
use migration::run_migrations;

/// Shared storage handle used by the HTTP API and billing pipeline.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL, ensures the schema is present
    /// and seeds the plan catalog.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        prepare_connection(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

pub(crate) async fn prepare_connection(db: &DatabaseConnection) -> StorageResult<()> {
    run_migrations(db).await?;
    seed_plan_catalog(db).await
}
