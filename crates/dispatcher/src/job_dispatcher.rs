use std::sync::Arc;
use std::time::Duration;

use fanout_core::{
    models::{describe_request_status, BrokerJobStatus, JobHandle, JobInfo, JobParams, SubmitRequest},
    time::{format_time, now},
    traits::JobQueue,
    FanoutError, FanoutResult,
};
use fanout_infrastructure::{MetricsCollector, TrackingCache};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::params::{idempotency_key, stamp};

/// 单任务分发的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub result: bool,
    pub job: JobInfo,
}

/// 单任务分发
///
/// 参数以内容哈希作为唯一ID提交到队列，任务记录写入缓存供状态查询使用。
/// 与扇出分发不同，这里的错误直接返回给调用方，不转换为结构化响应。
pub struct JobDispatcher {
    queue: Arc<dyn JobQueue>,
    tracking: TrackingCache,
    job_delete_timeout: Duration,
}

impl JobDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, tracking: TrackingCache, job_delete_timeout: Duration) -> Self {
        Self {
            queue,
            tracking,
            job_delete_timeout,
        }
    }

    #[instrument(skip(self, request_params, required), fields(function = %function_name))]
    pub async fn submit<S: AsRef<str>>(
        &self,
        request_params: &JobParams,
        function_name: &str,
        required: &[S],
        callback_type: &str,
    ) -> FanoutResult<DispatchResponse> {
        request_params.require(required)?;

        let setup_time = now();
        let mut params = request_params.clone();
        stamp(&mut params, callback_type, &setup_time);

        let key = idempotency_key(&params)?;
        debug!("幂等键: {}", key);

        let handle = self
            .queue
            .submit(SubmitRequest::background(function_name, params.clone()).with_unique_id(&key))
            .await?;

        if self.queue.honors_unique_id() && handle.id != key {
            return Err(FanoutError::IdempotencyMismatch {
                expected: key,
                actual: handle.id,
            });
        }
        MetricsCollector::record_job_submitted("dispatch");

        let job = JobInfo::new(&handle, format_time(&setup_time), params);
        self.tracking
            .record_job(&job, self.job_delete_timeout)
            .await?;

        log_submission(&handle);

        Ok(DispatchResponse { result: true, job })
    }
}

pub(crate) fn log_submission(handle: &JobHandle) {
    let status = BrokerJobStatus {
        id: handle.id.clone(),
        state: handle.state,
        result: None,
    };
    match describe_request_status(&status) {
        Some(description) => info!("Job [{}]", description),
        None => info!("Job [{}] {}", handle.id, handle.state),
    }
}
