use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use fanout_core::{
    config::WorkerConfig,
    models::{JobTiming, QueuedJob},
    time::now,
    traits::WorkerChannel,
    FanoutError, FanoutResult,
};
use fanout_infrastructure::MetricsCollector;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{sleep, timeout};
use tracing::{error, info, instrument, warn};

use crate::function::FunctionRegistry;
use crate::lifecycle::{LifecycleEmitter, LifecycleEvent, LifecycleListener};
use crate::tracker::JobTracker;

/// 单个任务的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { result: String, run_time: i64 },
    Failed(String),
    TimedOut,
}

impl JobOutcome {
    fn into_event(self, job_id: &str) -> LifecycleEvent {
        let job_id = job_id.to_string();
        match self {
            JobOutcome::Completed { result, run_time } => LifecycleEvent::Completed {
                job_id,
                result,
                run_time,
            },
            JobOutcome::Failed(detail) => LifecycleEvent::Failed { job_id, detail },
            JobOutcome::TimedOut => LifecycleEvent::TimedOut { job_id },
        }
    }
}

/// 本机节点ID，未配置时使用主机名
pub fn local_node(config: &WorkerConfig) -> String {
    config.node.clone().unwrap_or_else(hostname_or_unknown)
}

/// `<主机名>-<进程ID>`
pub fn default_worker_id() -> String {
    format!("{}-{}", hostname_or_unknown(), std::process::id())
}

fn hostname_or_unknown() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Worker进程的任务循环
///
/// 一次只执行一个任务，执行期间不响应停止信号，任务结束后才检查。
/// 每个任务的状态流转为 `dispatched → started → {completed | failed | timed_out}`，
/// 失败通过队列的失败信号上报，这里不重试。
pub struct WorkerRuntime {
    worker_id: String,
    channel: Arc<dyn WorkerChannel>,
    registry: Arc<FunctionRegistry>,
    tracker: Arc<dyn JobTracker>,
    lifecycle: LifecycleEmitter,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl WorkerRuntime {
    pub fn new(
        worker_id: impl Into<String>,
        channel: Arc<dyn WorkerChannel>,
        registry: Arc<FunctionRegistry>,
        tracker: Arc<dyn JobTracker>,
    ) -> Self {
        let defaults = WorkerConfig::default();
        Self {
            worker_id: worker_id.into(),
            channel,
            registry,
            tracker,
            lifecycle: LifecycleEmitter::new(),
            poll_interval: Duration::from_millis(defaults.poll_interval_ms),
            job_timeout: Duration::from_secs(defaults.job_timeout_seconds),
        }
    }

    pub fn from_config(
        config: &WorkerConfig,
        channel: Arc<dyn WorkerChannel>,
        registry: Arc<FunctionRegistry>,
        tracker: Arc<dyn JobTracker>,
    ) -> Self {
        Self::new(default_worker_id(), channel, registry, tracker)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
            .with_job_timeout(Duration::from_secs(config.job_timeout_seconds))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// 队列没有给出超时时间的任务使用此超时
    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.lifecycle.add_listener(listener);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 主循环，收到停止信号或发送端关闭后返回
    #[instrument(skip_all, fields(pid = std::process::id(), worker_id = %self.worker_id))]
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> FanoutResult<()> {
        let functions = self.registry.function_names();
        if functions.is_empty() {
            return Err(FanoutError::UnknownFunction(
                "Worker未注册任何任务函数".to_string(),
            ));
        }

        self.channel
            .register_worker(&self.worker_id, &functions)
            .await?;
        info!("A new child [{}] functions={:?}", std::process::id(), functions);

        // 领取中的任务可能已离开队列，只在两次领取之间检查停止信号
        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => {
                    info!("收到停止信号，Worker退出");
                    break;
                }
            }

            match self.channel.grab_job(&functions, self.poll_interval).await {
                Ok(Some(job)) => {
                    self.execute(job).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("领取任务失败: {}", e);
                    sleep(self.poll_interval).await;
                }
            }
        }

        if let Err(e) = self.channel.unregister_worker(&self.worker_id).await {
            warn!("注销Worker失败: {}", e);
        }
        Ok(())
    }

    /// 执行一个任务并上报结果，每个任务恰好产生一个终止事件
    #[instrument(skip(self, job), fields(job_id = %job.id, function = %job.function_name))]
    pub async fn execute(&self, job: QueuedJob) -> JobOutcome {
        self.lifecycle.emit(LifecycleEvent::Started {
            job_id: job.id.clone(),
            function: job.function_name.clone(),
        });
        let start_time = now();

        let outcome = self.run_function(&job, start_time).await;
        self.report(&job.id, &outcome).await;
        self.lifecycle.emit(outcome.clone().into_event(&job.id));

        outcome
    }

    async fn run_function(&self, job: &QueuedJob, start_time: NaiveDateTime) -> JobOutcome {
        let Some(function) = self.registry.get(&job.function_name) else {
            return JobOutcome::Failed(
                FanoutError::UnknownFunction(job.function_name.clone()).to_string(),
            );
        };
        let limit = job
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.job_timeout);

        let params = job.params.clone();
        let mut handle = tokio::spawn(async move { function.run(&params).await });

        let result = match timeout(limit, &mut handle).await {
            Err(_) => {
                handle.abort();
                return JobOutcome::TimedOut;
            }
            Ok(Err(join_error)) => {
                return JobOutcome::Failed(format!("任务函数异常退出: {join_error}"));
            }
            Ok(Ok(Err(e))) => return JobOutcome::Failed(e.to_string()),
            Ok(Ok(Ok(result))) => result,
        };

        match self.finish_tracking(&job.id, start_time, &result).await {
            Ok(timing) => {
                MetricsCollector::record_run_time(timing.run_time);
                JobOutcome::Completed {
                    result,
                    run_time: timing.run_time,
                }
            }
            Err(e) => JobOutcome::Failed(format!("更新任务记录失败: {e}")),
        }
    }

    async fn finish_tracking(
        &self,
        job_id: &str,
        start_time: NaiveDateTime,
        result: &str,
    ) -> FanoutResult<JobTiming> {
        let timing = self.tracker.update_job(job_id, start_time).await?;
        self.tracker.record_result(job_id, result).await?;
        Ok(timing)
    }

    async fn report(&self, job_id: &str, outcome: &JobOutcome) {
        let sent = match outcome {
            JobOutcome::Completed { result, .. } => {
                self.channel.send_work_complete(job_id, result).await
            }
            JobOutcome::Failed(detail) => self.channel.send_work_fail(job_id, detail).await,
            JobOutcome::TimedOut => self.channel.send_work_timeout(job_id).await,
        };
        if let Err(e) = sent {
            error!("上报任务 {} 结果失败: {}", job_id, e);
        }
    }
}
