//! Cache factory selecting the backend from the configured server URL

use super::{manager::RedisCacheManager, InMemoryCache};
use fanout_core::{config::CacheConfig, traits::CacheService, FanoutError, FanoutResult};
use std::sync::Arc;
use tracing::info;

/// Create the cache service for `cache.server`
///
/// `memory://` yields a process-local cache that is not shared with other processes.
pub async fn create_cache_service(config: &CacheConfig) -> FanoutResult<Arc<dyn CacheService>> {
    if config.server.starts_with("memory://") {
        info!("Using in-memory cache");
        return Ok(Arc::new(InMemoryCache::new()));
    }

    if config.server.starts_with("redis://") || config.server.starts_with("rediss://") {
        let manager = RedisCacheManager::new(&config.server, config.key_prefix.clone()).await?;
        return Ok(Arc::new(manager));
    }

    Err(FanoutError::Cache(format!(
        "Unsupported cache server: {}",
        config.server
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend() {
        let config = CacheConfig {
            server: "memory://".to_string(),
            ..Default::default()
        };
        let cache = create_cache_service(&config).await.unwrap();
        assert!(cache.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_unsupported_backend() {
        let config = CacheConfig {
            server: "memcache://localhost:11211".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_cache_service(&config).await,
            Err(FanoutError::Cache(_))
        ));
    }
}
