//! Factory functions for creating production-ready components
//!
//! Every store returned here is wrapped in `TracedStore`.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::contracts::SampleStore;
use crate::file_storage::FileStorage;
use crate::memory_storage::MemoryStorage;
use crate::postgres_storage::PostgresStorage;
use crate::wrappers::TracedStore;

/// Create the sample store selected by configuration
pub async fn create_store(config: &StorageConfig) -> Result<Arc<dyn SampleStore>> {
    let store: Arc<dyn SampleStore> = match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory sample store");
            Arc::new(TracedStore::new(MemoryStorage::new()))
        }
        StorageBackend::File => {
            let storage = FileStorage::open(&config.data_dir)
                .await
                .with_context(|| format!("Failed to open sample store at {}", config.data_dir))?;
            Arc::new(TracedStore::new(storage))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let storage = PostgresStorage::connect(url, config.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            Arc::new(TracedStore::new(storage))
        }
    };
    Ok(store)
}

/// In-memory store for tests
pub fn create_test_store() -> Arc<dyn SampleStore> {
    Arc::new(TracedStore::new(MemoryStorage::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ScanFilter;

    #[tokio::test]
    async fn test_create_file_store() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let config = StorageConfig {
            data_dir: dir.path().join("store").to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let store = create_store(&config).await?;
        assert!(store.scan("!r", &ScanFilter::unbounded()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_postgres_requires_url() {
        let config = StorageConfig {
            backend: StorageBackend::Postgres,
            database_url: None,
            ..StorageConfig::default()
        };
        assert!(create_store(&config).await.is_err());
    }
}
