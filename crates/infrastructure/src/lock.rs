//! 基于缓存的TTL锁
//!
//! 锁只是缓存中带过期时间的一个键，不记录持有者。获取失败时不排队，
//! 由调用方决定轮询还是放弃。

use std::sync::Arc;
use std::time::Duration;

use fanout_core::{traits::CacheService, FanoutResult};
use tracing::debug;

use crate::metrics::MetricsCollector;

pub const LOCK_VALUE: &[u8] = b"locked";

pub fn lock_key(key: &str) -> String {
    format!("lock-{key}")
}

#[derive(Clone)]
pub struct LockManager {
    cache: Arc<dyn CacheService>,
    default_ttl: Duration,
}

impl LockManager {
    pub fn new(cache: Arc<dyn CacheService>, default_ttl: Duration) -> Self {
        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// 获取锁，已被持有时返回 `false`。同时获取同一个键时只有一个调用方成功
    pub async fn acquire(&self, key: &str, ttl: Duration) -> FanoutResult<bool> {
        if !self.cache.add(&lock_key(key), LOCK_VALUE, ttl).await? {
            debug!("锁已被持有: {}", key);
            return Ok(false);
        }

        MetricsCollector::record_lock_acquired();
        debug!("获取锁: {} (ttl {:?})", key, ttl);
        Ok(true)
    }

    pub async fn acquire_default(&self, key: &str) -> FanoutResult<bool> {
        self.acquire(key, self.default_ttl).await
    }

    pub async fn is_locked(&self, key: &str) -> FanoutResult<bool> {
        Ok(self.cache.get(&lock_key(key)).await?.is_some())
    }

    /// 释放锁，锁不存在时同样成功
    pub async fn release(&self, key: &str) -> FanoutResult<()> {
        self.cache.delete(&lock_key(key)).await?;
        debug!("释放锁: {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    fn manager() -> LockManager {
        LockManager::new(Arc::new(InMemoryCache::new()), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_second_acquire_fails_until_release() {
        let locks = manager();
        assert!(locks.acquire_default("n1").await.unwrap());
        assert!(locks.is_locked("n1").await.unwrap());
        assert!(!locks.acquire_default("n1").await.unwrap());

        locks.release("n1").await.unwrap();
        assert!(!locks.is_locked("n1").await.unwrap());
        assert!(locks.acquire_default("n1").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let locks = manager();
        locks.release("never-held").await.unwrap();
        locks.release("never-held").await.unwrap();
        assert!(!locks.is_locked("never-held").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_after_ttl() {
        let locks = manager();
        assert!(locks.acquire("n1", Duration::from_secs(60)).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!locks.is_locked("n1").await.unwrap());
        assert!(locks.acquire("n1", Duration::from_secs(60)).await.unwrap());
    }

    /// 每次缓存调用前让出一次调度，模拟网络往返
    struct YieldingCache(InMemoryCache);

    #[async_trait::async_trait]
    impl CacheService for YieldingCache {
        async fn get(&self, key: &str) -> FanoutResult<Option<Vec<u8>>> {
            tokio::task::yield_now().await;
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> FanoutResult<()> {
            tokio::task::yield_now().await;
            self.0.set(key, value, ttl).await
        }

        async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> FanoutResult<bool> {
            tokio::task::yield_now().await;
            self.0.add(key, value, ttl).await
        }

        async fn replace(
            &self,
            key: &str,
            value: &[u8],
            ttl: Option<Duration>,
        ) -> FanoutResult<bool> {
            tokio::task::yield_now().await;
            self.0.replace(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> FanoutResult<bool> {
            tokio::task::yield_now().await;
            self.0.delete(key).await
        }

        async fn exists(&self, key: &str) -> FanoutResult<bool> {
            self.0.exists(key).await
        }

        async fn health_check(&self) -> FanoutResult<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_concurrent_acquire_grants_one_holder() {
        let locks = LockManager::new(
            Arc::new(YieldingCache(InMemoryCache::new())),
            Duration::from_secs(300),
        );

        let (a, b) = tokio::join!(
            locks.acquire_default("10.0.0.1"),
            locks.acquire_default("10.0.0.1")
        );
        let granted = [a.unwrap(), b.unwrap()];
        assert_eq!(granted.iter().filter(|g| **g).count(), 1);
        assert!(locks.is_locked("10.0.0.1").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_tasks_race_for_one_lock() {
        let locks = manager();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let locks = locks.clone();
                tokio::spawn(async move { locks.acquire_default("shared").await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let locks = manager();
        assert!(locks.acquire_default("n1").await.unwrap());
        assert!(locks.acquire_default("n2").await.unwrap());
    }
}
