use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fanout_core::{
    config::{AppConfig, TrackerKind},
    models::{AdminStatus, FunctionTemplate, JobParams, PacketStatus, StatusLookup},
    traits::{CacheService, TrackingStore},
    FanoutError,
};
use fanout_dispatcher::{
    DispatchResponse, FanoutCoordinator, FanoutResponse, JobDispatcher, StaticNodeDirectory,
    StatusTracker,
};
use fanout_infrastructure::{
    create_cache_service, DatabaseManager, JobQueueFactory, LockManager, QueueBackend,
    TrackingCache,
};
use fanout_worker::{
    local_node, CacheJobTracker, FunctionRegistry, JobTracker, StoreJobTracker, WorkerRuntime,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info};

/// 锁操作的输出
#[derive(Debug, Serialize)]
pub struct LockReport {
    pub key: String,
    pub locked: bool,
}

fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// 按需连接各个后端
///
/// 每个命令只连接自己用到的后端，例如锁命令不需要队列和数据库。
pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    async fn queue_backend(&self) -> Result<QueueBackend> {
        JobQueueFactory::create(&self.config.main, &self.config.cache.key_prefix)
            .await
            .with_context(|| format!("连接任务队列失败: {}", self.config.main.queue_server))
    }

    async fn cache(&self) -> Result<Arc<dyn CacheService>> {
        create_cache_service(&self.config.cache)
            .await
            .with_context(|| format!("连接缓存失败: {}", self.config.cache.server))
    }

    async fn tracking_cache(&self) -> Result<TrackingCache> {
        Ok(TrackingCache::new(self.cache().await?))
    }

    async fn store(&self) -> Result<Arc<dyn TrackingStore>> {
        let manager = DatabaseManager::new(&self.config.database)
            .await
            .context("连接跟踪数据库失败")?;
        manager.ensure_schema().await.context("初始化数据库表结构失败")?;
        info!("跟踪数据库已就绪: {:?}", manager.database_type());
        Ok(manager.tracking_store())
    }

    /// 单任务分发，错误直接返回
    pub async fn dispatch(
        &self,
        params: &JobParams,
        function_name: &str,
        required: &[String],
        callback_type: &str,
    ) -> Result<DispatchResponse> {
        let dispatcher = JobDispatcher::new(
            self.queue_backend().await?.queue,
            self.tracking_cache().await?,
            Duration::from_secs(self.config.main.job_delete_timeout),
        );
        Ok(dispatcher
            .submit(params, function_name, required, callback_type)
            .await?)
    }

    /// 扇出分发，失败以结构化响应返回
    pub async fn fanout(
        &self,
        params: &JobParams,
        function: &str,
        required: &[String],
        packet_type: &str,
    ) -> Result<FanoutResponse> {
        let template = FunctionTemplate::new(function)?;
        let coordinator = FanoutCoordinator::new(
            self.queue_backend().await?.queue,
            self.store().await?,
            Arc::new(StaticNodeDirectory::from_config(&self.config.nodes)),
        );
        Ok(coordinator
            .submit(params, &template, required, packet_type)
            .await)
    }

    async fn status_tracker(&self) -> Result<StatusTracker> {
        Ok(StatusTracker::new(
            self.tracking_cache().await?,
            self.store().await?,
            self.queue_backend().await?.queue,
        ))
    }

    pub async fn status(&self, uid: &str) -> Result<StatusLookup> {
        Ok(self.status_tracker().await?.lookup(uid).await?)
    }

    pub async fn packet(&self, packet_id: i64) -> Result<PacketStatus> {
        self.status_tracker()
            .await?
            .lookup_packet(packet_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("任务包不存在: {packet_id}"))
    }

    pub async fn queue_status(&self) -> Result<AdminStatus> {
        Ok(self.queue_backend().await?.queue.admin_status().await?)
    }

    fn lock_manager(cache: Arc<dyn CacheService>, config: &AppConfig) -> LockManager {
        LockManager::new(cache, config.cache.lock_ttl())
    }

    /// 获取锁，已被持有时返回 `LockUnavailable`
    pub async fn lock_acquire(&self, key: &str, ttl_minutes: Option<u64>) -> Result<LockReport> {
        let locks = Self::lock_manager(self.cache().await?, &self.config);
        let ttl = ttl_minutes
            .map(minutes_to_duration)
            .unwrap_or_else(|| locks.default_ttl());

        if !locks.acquire(key, ttl).await? {
            return Err(FanoutError::LockUnavailable(key.to_string()).into());
        }
        Ok(LockReport {
            key: key.to_string(),
            locked: true,
        })
    }

    pub async fn lock_check(&self, key: &str) -> Result<LockReport> {
        let locks = Self::lock_manager(self.cache().await?, &self.config);
        Ok(LockReport {
            key: key.to_string(),
            locked: locks.is_locked(key).await?,
        })
    }

    pub async fn lock_release(&self, key: &str) -> Result<LockReport> {
        let locks = Self::lock_manager(self.cache().await?, &self.config);
        locks.release(key).await?;
        Ok(LockReport {
            key: key.to_string(),
            locked: false,
        })
    }

    /// 单个Worker进程，收到停止信号后处理完当前任务再退出
    pub async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let worker_config = &self.config.worker;
        let node = local_node(worker_config);
        let registry = FunctionRegistry::with_builtins(node.clone(), &worker_config.functions)
            .context("注册任务函数失败")?;

        let tracker: Arc<dyn JobTracker> = match worker_config.tracker {
            TrackerKind::Cache => Arc::new(CacheJobTracker::new(self.tracking_cache().await?)),
            TrackerKind::Store => Arc::new(StoreJobTracker::new(self.store().await?)),
        };

        let runtime = WorkerRuntime::from_config(
            worker_config,
            self.queue_backend().await?.channel,
            Arc::new(registry),
            tracker,
        );
        info!(
            "Worker {} 启动，节点 {}，计时后端 {:?}",
            runtime.worker_id(),
            node,
            worker_config.tracker
        );

        if let Err(e) = runtime.run(shutdown_rx).await {
            error!("Worker运行失败: {}", e);
            return Err(e.into());
        }
        info!("Worker {} 已退出", runtime.worker_id());
        Ok(())
    }
}
