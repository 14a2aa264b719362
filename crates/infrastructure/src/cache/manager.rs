//! Redis cache manager implementation

use async_trait::async_trait;
use fanout_core::{traits::CacheService, FanoutError, FanoutResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

fn cache_error(e: redis::RedisError) -> FanoutError {
    FanoutError::Cache(e.to_string())
}

/// Redis cache manager
///
/// A connection manager is created per operation; no state is shared between calls.
#[derive(Clone)]
pub struct RedisCacheManager {
    client: Arc<redis::Client>,
    key_prefix: String,
}

impl RedisCacheManager {
    /// Create a new Redis cache manager and verify the server answers PING
    pub async fn new(url: &str, key_prefix: impl Into<String>) -> FanoutResult<Self> {
        info!("Creating Redis cache manager with URL: {}", url);

        let client = redis::Client::open(url).map_err(cache_error)?;

        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(cache_error)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        info!("Redis cache manager created successfully");

        Ok(Self {
            client: Arc::new(client),
            key_prefix: key_prefix.into(),
        })
    }

    async fn get_connection(&self) -> FanoutResult<redis::aio::ConnectionManager> {
        self.client
            .get_connection_manager()
            .await
            .map_err(cache_error)
    }

    /// Build full cache key with prefix
    fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheService for RedisCacheManager {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> FanoutResult<Option<Vec<u8>>> {
        let full_key = self.build_key(key);
        let mut conn = self.get_connection().await?;

        let result: Option<Vec<u8>> = redis::cmd("GET")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache GET failed for key {}: {}", full_key, e);
                cache_error(e)
            })?;

        match &result {
            Some(_) => debug!("Cache HIT: {}", full_key),
            None => debug!("Cache MISS: {}", full_key),
        }
        Ok(result)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> FanoutResult<()> {
        let full_key = self.build_key(key);
        debug!("Cache SET: {} with TTL: {:?}", full_key, ttl);

        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("SETEX")
            .arg(&full_key)
            .arg(ttl_seconds(ttl))
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache SET failed for key {}: {}", full_key, e);
                cache_error(e)
            })?;

        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> FanoutResult<bool> {
        let full_key = self.build_key(key);
        let mut conn = self.get_connection().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(&full_key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache ADD failed for key {}: {}", full_key, e);
                cache_error(e)
            })?;

        let added = result.is_some();
        debug!("Cache ADD {}: {}", full_key, added);
        Ok(added)
    }

    #[instrument(skip(self, value))]
    async fn replace(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> FanoutResult<bool> {
        let full_key = self.build_key(key);
        let mut conn = self.get_connection().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&full_key).arg(value).arg("XX");
        match ttl {
            Some(ttl) => cmd.arg("EX").arg(ttl_seconds(ttl)),
            None => cmd.arg("KEEPTTL"),
        };

        let result: Option<String> = cmd.query_async(&mut conn).await.map_err(|e| {
            error!("Cache REPLACE failed for key {}: {}", full_key, e);
            cache_error(e)
        })?;

        let replaced = result.is_some();
        debug!("Cache REPLACE {}: {}", full_key, replaced);
        Ok(replaced)
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> FanoutResult<bool> {
        let full_key = self.build_key(key);
        let mut conn = self.get_connection().await?;

        let result: i32 = redis::cmd("DEL")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache DELETE failed for key {}: {}", full_key, e);
                cache_error(e)
            })?;

        Ok(result > 0)
    }

    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> FanoutResult<bool> {
        let full_key = self.build_key(key);
        let mut conn = self.get_connection().await?;

        let result: i32 = redis::cmd("EXISTS")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        Ok(result > 0)
    }

    async fn health_check(&self) -> FanoutResult<bool> {
        let mut conn = self.get_connection().await?;

        let result: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Cache health check failed: {}", e);
                cache_error(e)
            })?;

        Ok(result == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::redis::Redis;

    #[test]
    fn test_key_building() {
        let cache = RedisCacheManager {
            client: Arc::new(redis::Client::open("redis://localhost:6379").unwrap()),
            key_prefix: "test".to_string(),
        };

        assert_eq!(cache.build_key("task-123"), "test:task-123");
        assert_eq!(cache.build_key("lock-n1"), "test:lock-n1");
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_replace_only_existing_keys() {
        let container = Redis::default().start().await.unwrap();
        let port = container.get_host_port_ipv4(6379).await.unwrap();
        let cache = RedisCacheManager::new(&format!("redis://127.0.0.1:{port}"), "test")
            .await
            .unwrap();

        assert!(!cache.replace("k", b"v", None).await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());

        assert!(cache.add("a", b"1", Duration::from_secs(60)).await.unwrap());
        assert!(!cache.add("a", b"2", Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some(&b"1"[..]));

        cache.set("k", b"v1", Duration::from_secs(60)).await.unwrap();
        assert!(cache.replace("k", b"v2", None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some(&b"v2"[..]));

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.exists("k").await.unwrap());
        assert!(cache.health_check().await.unwrap());
    }
}
