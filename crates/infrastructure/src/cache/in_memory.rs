use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanout_core::{traits::CacheService, FanoutResult};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// 进程内缓存实现，用于单进程部署和测试
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 过期时刻，超出 `Instant` 表示范围时按一百年计
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600))
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未过期的条目数
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheService for InMemoryCache {
    async fn get(&self, key: &str) -> FanoutResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> FanoutResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_vec(),
                expires_at: expiry(Instant::now(), ttl),
            },
        );
        Ok(())
    }

    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> FanoutResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_vec(),
                expires_at: expiry(now, ttl),
            },
        );
        Ok(true)
    }

    async fn replace(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> FanoutResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.value = value.to_vec();
                if let Some(ttl) = ttl {
                    entry.expires_at = expiry(now, ttl);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> FanoutResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn exists(&self, key: &str) -> FanoutResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn health_check(&self) -> FanoutResult<bool> {
        Ok(true)
    }
}
