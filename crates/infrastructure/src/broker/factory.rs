use std::sync::Arc;
use std::time::Duration;

use fanout_core::{
    config::MainConfig,
    traits::{JobQueue, WorkerChannel},
    FanoutError, FanoutResult,
};
use tracing::{debug, info};

use super::{InMemoryJobQueue, RedisJobQueue};

/// 同一队列后端的客户端与Worker两个视图
#[derive(Clone)]
pub struct QueueBackend {
    pub queue: Arc<dyn JobQueue>,
    pub channel: Arc<dyn WorkerChannel>,
}

impl QueueBackend {
    pub fn from_shared<Q>(backend: Arc<Q>) -> Self
    where
        Q: JobQueue + WorkerChannel + 'static,
    {
        Self {
            queue: backend.clone(),
            channel: backend,
        }
    }
}

pub struct JobQueueFactory;

impl JobQueueFactory {
    /// 根据 `main.queue_server` 创建队列后端
    pub async fn create(config: &MainConfig, key_prefix: &str) -> FanoutResult<QueueBackend> {
        debug!("Creating job queue for {}", config.queue_server);
        let submit_timeout = Duration::from_secs(config.submit_timeout_seconds);

        if config.queue_server.starts_with("memory://") {
            info!("Initializing in-memory job queue");
            let queue = InMemoryJobQueue::with_timeouts(Duration::from_millis(50), submit_timeout)
                .with_job_retention(Duration::from_secs(config.job_delete_timeout.max(1)));
            return Ok(QueueBackend::from_shared(Arc::new(queue)));
        }

        if config.queue_server.starts_with("redis://")
            || config.queue_server.starts_with("rediss://")
        {
            info!("Initializing Redis job queue");
            let queue = RedisJobQueue::new(&config.queue_server, key_prefix)
                .await?
                .with_submit_timeout(submit_timeout)
                .with_job_retention(Duration::from_secs(config.job_delete_timeout.max(1)));
            return Ok(QueueBackend::from_shared(Arc::new(queue)));
        }

        Err(FanoutError::BrokerConnection(format!(
            "不支持的队列地址: {}",
            config.queue_server
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::models::{JobParams, SubmitRequest};

    #[tokio::test]
    async fn test_memory_backend_shares_state() {
        let config = MainConfig {
            queue_server: "memory://".to_string(),
            ..Default::default()
        };
        let backend = JobQueueFactory::create(&config, "test").await.unwrap();

        let handle = backend
            .queue
            .submit(SubmitRequest::background("f", JobParams::new()))
            .await
            .unwrap();
        let job = backend
            .channel
            .grab_job(&["f".to_string()], Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.id, handle.id);
    }

    #[tokio::test]
    async fn test_unsupported_backend() {
        let config = MainConfig {
            queue_server: "gearman://localhost:4730".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            JobQueueFactory::create(&config, "test").await,
            Err(FanoutError::BrokerConnection(_))
        ));
    }
}
