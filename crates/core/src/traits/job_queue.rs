use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use crate::{
    models::{AdminStatus, BrokerJobStatus, JobHandle, QueuedJob, SubmitRequest},
    FanoutError, FanoutResult,
};

/// 任务队列客户端接口
///
/// 队列不可达时返回 `FanoutError::BrokerConnection`，调用方在同一调用路径内不重试。
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 提交任务，`background` 为真时立即返回不等待执行
    async fn submit(&self, request: SubmitRequest) -> FanoutResult<JobHandle>;

    /// 查询单个任务状态，队列不认识的任务返回 `JobState::Unknown`
    async fn status(&self, job_id: &str) -> FanoutResult<BrokerJobStatus>;

    /// 队列管理状态：各函数的排队情况、版本和Worker列表
    async fn admin_status(&self) -> FanoutResult<AdminStatus>;

    /// 队列是否以客户端提供的唯一ID作为任务ID
    fn honors_unique_id(&self) -> bool {
        true
    }
}

/// Worker侧的队列接口
#[async_trait]
pub trait WorkerChannel: Send + Sync {
    async fn register_worker(&self, worker_id: &str, functions: &[String]) -> FanoutResult<()>;

    async fn unregister_worker(&self, worker_id: &str) -> FanoutResult<()>;

    /// 领取一个任务，最多等待 `wait`
    async fn grab_job(&self, functions: &[String], wait: Duration)
        -> FanoutResult<Option<QueuedJob>>;

    async fn send_work_complete(&self, job_id: &str, result: &str) -> FanoutResult<()>;

    async fn send_work_fail(&self, job_id: &str, detail: &str) -> FanoutResult<()>;

    async fn send_work_timeout(&self, job_id: &str) -> FanoutResult<()>;
}

/// 轮询任务状态直到终止，用于非后台提交
pub async fn await_terminal<Q: JobQueue + ?Sized>(
    queue: &Q,
    job_id: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> FanoutResult<BrokerJobStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        let status = queue.status(job_id).await?;
        if status.state.is_terminal() {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            return Err(FanoutError::JobExecution(format!(
                "等待任务 {job_id} 完成超时"
            )));
        }
        sleep(poll_interval).await;
    }
}
