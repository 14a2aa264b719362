use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use fanout_core::{
    models::JobTiming,
    time::{format_run_time, now},
    traits::TrackingStore,
    FanoutError, FanoutResult,
};
use fanout_infrastructure::TrackingCache;
use tracing::{debug, info, instrument};

/// 任务完成时写回计时信息的后端
///
/// 计时由开始时间与当前时间计算，两种后端共用同一计算逻辑。
#[async_trait]
pub trait JobTracker: Send + Sync {
    /// 以 `start_time` 到当前时间写入计时字段
    async fn update_job(&self, job_uid: &str, start_time: NaiveDateTime) -> FanoutResult<JobTiming> {
        let timing = JobTiming::between(start_time, now());
        self.write_timing(job_uid, &timing).await?;
        info!(
            "Update job=[{}] start_time=[{}] end_time=[{}] run_time=[{}]",
            job_uid,
            timing.start_time,
            timing.end_time,
            format_run_time(timing.run_time)
        );
        Ok(timing)
    }

    async fn write_timing(&self, job_uid: &str, timing: &JobTiming) -> FanoutResult<()>;

    /// 保存任务结果，不保存结果的后端忽略
    async fn record_result(&self, _job_uid: &str, _result: &str) -> FanoutResult<()> {
        Ok(())
    }
}

/// 计时写入缓存中的任务记录（单次分发的任务）
pub struct CacheJobTracker {
    tracking: TrackingCache,
}

impl CacheJobTracker {
    pub fn new(tracking: TrackingCache) -> Self {
        Self { tracking }
    }
}

#[async_trait]
impl JobTracker for CacheJobTracker {
    #[instrument(skip(self, timing))]
    async fn write_timing(&self, job_uid: &str, timing: &JobTiming) -> FanoutResult<()> {
        let info = self.tracking.merge_timing(job_uid, timing).await?;
        debug!("缓存任务记录已更新: {:?}", info);
        Ok(())
    }
}

/// 计时写入数据库 `job` 表（扇出任务）
pub struct StoreJobTracker {
    store: Arc<dyn TrackingStore>,
}

impl StoreJobTracker {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    async fn ensure_single_row(&self, job_uid: &str) -> FanoutResult<()> {
        let rows = self.store.find_jobs_by_uid(job_uid).await?;
        match rows.len() {
            0 => Err(FanoutError::JobNotFound {
                uid: job_uid.to_string(),
            }),
            1 => Ok(()),
            count => Err(FanoutError::AmbiguousRecord {
                uid: job_uid.to_string(),
                count,
            }),
        }
    }
}

#[async_trait]
impl JobTracker for StoreJobTracker {
    #[instrument(skip(self, timing))]
    async fn write_timing(&self, job_uid: &str, timing: &JobTiming) -> FanoutResult<()> {
        self.ensure_single_row(job_uid).await?;
        self.store.update_job_timing(job_uid, timing).await?;
        Ok(())
    }

    async fn record_result(&self, job_uid: &str, result: &str) -> FanoutResult<()> {
        self.store.update_job_result(job_uid, result).await?;
        Ok(())
    }
}
