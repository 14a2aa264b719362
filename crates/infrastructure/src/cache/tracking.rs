use std::sync::Arc;
use std::time::Duration;

use fanout_core::{
    models::{JobInfo, JobTiming},
    traits::CacheService,
    FanoutError, FanoutResult,
};
use tracing::{debug, instrument};

/// 缓存中任务记录的键
pub fn job_cache_key(job_uid: &str) -> String {
    format!("task-{job_uid}")
}

/// 单次分发任务的缓存记录
///
/// 记录以JSON保存，更新时读取、合并后原样写回，保留原有过期时间。
#[derive(Clone)]
pub struct TrackingCache {
    cache: Arc<dyn CacheService>,
}

impl TrackingCache {
    pub fn new(cache: Arc<dyn CacheService>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<dyn CacheService> {
        &self.cache
    }

    #[instrument(skip(self, info), fields(job_id = %info.id))]
    pub async fn record_job(&self, info: &JobInfo, ttl: Duration) -> FanoutResult<()> {
        let bytes = serde_json::to_vec(info)?;
        self.cache.set(&job_cache_key(&info.id), &bytes, ttl).await?;
        debug!("缓存任务记录: {}", info.id);
        Ok(())
    }

    pub async fn get_job(&self, job_uid: &str) -> FanoutResult<Option<JobInfo>> {
        match self.cache.get(&job_cache_key(job_uid)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 读取、修改并写回任务记录，记录不存在时返回 `JobNotFound`
    pub async fn update_job<F>(&self, job_uid: &str, update: F) -> FanoutResult<JobInfo>
    where
        F: FnOnce(&mut JobInfo) + Send,
    {
        let not_found = || FanoutError::JobNotFound {
            uid: job_uid.to_string(),
        };

        let mut info = self.get_job(job_uid).await?.ok_or_else(not_found)?;
        update(&mut info);

        let bytes = serde_json::to_vec(&info)?;
        if !self
            .cache
            .replace(&job_cache_key(job_uid), &bytes, None)
            .await?
        {
            return Err(not_found());
        }
        Ok(info)
    }

    pub async fn merge_timing(&self, job_uid: &str, timing: &JobTiming) -> FanoutResult<JobInfo> {
        self.update_job(job_uid, |info| info.apply_timing(timing))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use fanout_core::models::{JobHandle, JobParams, JobState};
    use fanout_core::time::parse_time;

    fn tracking() -> TrackingCache {
        TrackingCache::new(Arc::new(InMemoryCache::new()))
    }

    fn info(id: &str) -> JobInfo {
        JobInfo::new(
            &JobHandle {
                id: id.to_string(),
                state: JobState::Submitted,
            },
            "2024-01-01 00:00:00".to_string(),
            JobParams::new().with("server", "s1"),
        )
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let tracking = tracking();
        tracking
            .record_job(&info("abc"), Duration::from_secs(60))
            .await
            .unwrap();

        let cached = tracking.get_job("abc").await.unwrap().unwrap();
        assert_eq!(cached.id, "abc");
        assert!(tracking.get_job("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_timing_updates_record() {
        let tracking = tracking();
        tracking
            .record_job(&info("abc"), Duration::from_secs(60))
            .await
            .unwrap();

        let timing = JobTiming::between(
            parse_time("2024-01-01 23:59:00").unwrap(),
            parse_time("2024-01-02 00:00:45").unwrap(),
        );
        let merged = tracking.merge_timing("abc", &timing).await.unwrap();
        assert_eq!(merged.run_time, Some(105));

        let cached = tracking.get_job("abc").await.unwrap().unwrap();
        assert_eq!(cached.start_time.as_deref(), Some("2024-01-01 23:59:00"));
        assert_eq!(cached.end_time.as_deref(), Some("2024-01-02 00:00:45"));
        assert_eq!(cached.params.get_string("server").as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let tracking = tracking();
        let err = tracking
            .update_job("missing", |info| info.state = JobState::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, FanoutError::JobNotFound { .. }));
    }
}
