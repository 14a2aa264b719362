use async_trait::async_trait;

use crate::{
    models::{JobPacket, JobRecord, JobTiming, NewJobPacket, NewJobRecord},
    FanoutResult,
};

/// 任务跟踪存储接口
///
/// 持久化保存任务包和任务行，进程重启后仍然可用。
/// 写入本身不加锁，同一任务ID的并发写入可能相互覆盖。
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// 建表（如果不存在）
    async fn ensure_schema(&self) -> FanoutResult<()>;

    /// 插入任务包，返回生成的任务包ID
    async fn insert_packet(&self, packet: &NewJobPacket) -> FanoutResult<i64>;

    async fn insert_job(&self, job: &NewJobRecord) -> FanoutResult<()>;

    /// 按队列任务ID查询任务行，可能返回多行
    async fn find_jobs_by_uid(&self, job_uid: &str) -> FanoutResult<Vec<JobRecord>>;

    /// 写入计时字段，返回受影响的行数
    async fn update_job_timing(&self, job_uid: &str, timing: &JobTiming) -> FanoutResult<u64>;

    /// 写入执行结果，返回受影响的行数
    async fn update_job_result(&self, job_uid: &str, result: &str) -> FanoutResult<u64>;

    async fn get_packet(&self, packet_id: i64) -> FanoutResult<Option<JobPacket>>;

    /// 按插入顺序返回任务包下的任务行
    async fn jobs_for_packet(&self, packet_id: i64) -> FanoutResult<Vec<JobRecord>>;

    async fn health_check(&self) -> FanoutResult<()>;
}
