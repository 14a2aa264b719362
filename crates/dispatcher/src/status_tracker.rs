use std::sync::Arc;

use fanout_core::{
    models::{LookupParams, LookupState, PacketStatus, StatusLookup, TrackedJob},
    traits::{JobQueue, TrackingStore},
    FanoutError, FanoutResult,
};
use fanout_infrastructure::TrackingCache;
use tracing::{debug, instrument, warn};

/// 任务状态查询
///
/// 任务记录先查缓存，缓存没有时查数据库；状态结论来自队列。
/// 缓存与数据库都没有的任务返回 `unknown`，不视为错误。
pub struct StatusTracker {
    tracking: TrackingCache,
    store: Arc<dyn TrackingStore>,
    queue: Arc<dyn JobQueue>,
}

impl StatusTracker {
    pub fn new(
        tracking: TrackingCache,
        store: Arc<dyn TrackingStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            tracking,
            store,
            queue,
        }
    }

    #[instrument(skip(self))]
    pub async fn lookup(&self, uid: &str) -> FanoutResult<StatusLookup> {
        let Some(job_data) = self.find_record(uid).await? else {
            debug!("任务 {} 未被记录", uid);
            return Ok(StatusLookup::unknown(uid));
        };

        let status = match self.queue.status(uid).await {
            Ok(broker_status) => LookupState::from_broker(&broker_status),
            Err(e) => {
                warn!("查询队列状态失败 {}: {}", uid, e);
                LookupState::ConnectionFailed
            }
        };

        Ok(StatusLookup {
            job_data: Some(job_data),
            params: LookupParams {
                uid: uid.to_string(),
            },
            status,
        })
    }

    /// 任务包及其任务行，任务包只保存在数据库中
    pub async fn lookup_packet(&self, packet_id: i64) -> FanoutResult<Option<PacketStatus>> {
        let Some(packet) = self.store.get_packet(packet_id).await? else {
            return Ok(None);
        };
        let jobs = self.store.jobs_for_packet(packet_id).await?;
        Ok(Some(PacketStatus { packet, jobs }))
    }

    async fn find_record(&self, uid: &str) -> FanoutResult<Option<TrackedJob>> {
        match self.tracking.get_job(uid).await {
            Ok(Some(info)) => return Ok(Some(TrackedJob::Cache(info))),
            Ok(None) => {}
            Err(e) => warn!("读取缓存失败 {}，改查数据库: {}", uid, e),
        }

        let mut rows = self.store.find_jobs_by_uid(uid).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop().map(TrackedJob::Store)),
            count => Err(FanoutError::AmbiguousRecord {
                uid: uid.to_string(),
                count,
            }),
        }
    }
}
