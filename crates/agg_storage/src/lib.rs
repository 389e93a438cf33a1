use async_trait::async_trait;
use agg_core::config::{StorageBackendKind, StorageConfig};
use agg_core::{ArticleCache, ArticleStorage, Result};
use std::sync::Arc;
use tracing::info;

pub mod backends;
pub mod cache;

pub use backends::*;
pub use cache::MemoryCache;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name() -> &'static str;
    async fn open(config: &StorageConfig) -> Result<Self> where Self: Sized;
}

async fn open_backend<T: StorageBackend + ArticleStorage + 'static>(
    config: &StorageConfig,
) -> Result<Arc<dyn ArticleStorage>> {
    let storage = T::open(config).await?;
    info!("🏦 Storage backend opened (using {})", T::name());
    Ok(Arc::new(storage))
}

pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ArticleStorage>> {
    match config.backend {
        StorageBackendKind::Memory => open_backend::<MemoryStorage>(config).await,
        #[cfg(feature = "sqlite")]
        StorageBackendKind::Sqlite => open_backend::<SQLiteStorage>(config).await,
        #[cfg(not(feature = "sqlite"))]
        StorageBackendKind::Sqlite => Err(agg_core::Error::Config(
            "sqlite storage requires the `sqlite` feature".to_string(),
        )),
    }
}

pub fn create_cache(config: &StorageConfig) -> Option<Arc<dyn ArticleCache>> {
    config
        .cache
        .then(|| Arc::new(MemoryCache::new(config.cache_ttl)) as Arc<dyn ArticleCache>)
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_cache, create_storage, StorageBackend};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_storage() {
        let config = StorageConfig {
            backend: StorageBackendKind::Memory,
            ..Default::default()
        };
        let storage = create_storage(&config).await.unwrap();
        assert!(storage.ping().await.is_ok());
    }

    #[test]
    fn test_cache_toggle() {
        let mut config = StorageConfig::default();
        assert!(create_cache(&config).is_some());
        config.cache = false;
        assert!(create_cache(&config).is_none());
    }
}
