use serde::{Deserialize, Serialize};

/// 任务队列相关配置（`[main]`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MainConfig {
    /// 队列地址，`redis://` 或 `memory://`
    pub queue_server: String,
    /// 单次分发的任务在缓存中的保留时间（秒）
    pub job_delete_timeout: u64,
    /// 非后台提交等待完成的最长时间（秒）
    pub submit_timeout_seconds: u64,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            queue_server: "redis://127.0.0.1:6379".to_string(),
            job_delete_timeout: 3600,
            submit_timeout_seconds: 30,
        }
    }
}

impl MainConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_server.is_empty() {
            return Err(anyhow::anyhow!("队列地址不能为空"));
        }

        if !is_supported_backend_url(&self.queue_server) {
            return Err(anyhow::anyhow!("不支持的队列地址: {}", self.queue_server));
        }

        if self.job_delete_timeout == 0 {
            return Err(anyhow::anyhow!("任务删除超时必须大于0"));
        }

        if self.submit_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("提交等待超时必须大于0"));
        }

        Ok(())
    }
}

/// 缓存相关配置（`[cache]`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 缓存地址，`redis://` 或 `memory://`
    pub server: String,
    /// 锁的过期时间（分钟）
    pub lock_expire: u64,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            server: "redis://127.0.0.1:6379".to_string(),
            lock_expire: 5,
            key_prefix: "fanout".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_supported_backend_url(&self.server) {
            return Err(anyhow::anyhow!("不支持的缓存地址: {}", self.server));
        }

        if self.lock_expire == 0 {
            return Err(anyhow::anyhow!("锁过期时间必须大于0"));
        }

        Ok(())
    }

    pub fn lock_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lock_expire.saturating_mul(60))
    }
}

fn is_supported_backend_url(url: &str) -> bool {
    url.starts_with("redis://") || url.starts_with("rediss://") || url.starts_with("memory://")
}
