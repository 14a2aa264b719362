use std::time::Duration;

use async_trait::async_trait;

use crate::FanoutResult;

/// 键值缓存接口，值为不透明的序列化数据
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> FanoutResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> FanoutResult<()>;

    /// 仅当键不存在时写入，检查与写入是一次原子操作。返回是否写入
    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> FanoutResult<bool>;

    /// 仅当键存在时替换值，`ttl` 为 `None` 时保留原有过期时间。
    /// 返回是否发生了替换
    async fn replace(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> FanoutResult<bool>;

    /// 删除键，返回键是否存在
    async fn delete(&self, key: &str) -> FanoutResult<bool>;

    async fn exists(&self, key: &str) -> FanoutResult<bool>;

    async fn health_check(&self) -> FanoutResult<bool>;
}
