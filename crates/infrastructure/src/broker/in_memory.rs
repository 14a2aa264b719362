use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanout_core::{
    models::{
        AdminStatus, BrokerJobStatus, FunctionStatus, JobHandle, JobParams, JobState, QueuedJob,
        SubmitRequest, WorkerEntry,
    },
    traits::{await_terminal, JobQueue, WorkerChannel},
    FanoutError, FanoutResult,
};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// 内存任务队列实现
///
/// 适用于单进程嵌入式部署和测试，同一进程内的客户端与Worker共享队列状态。
#[derive(Debug, Clone)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
    poll_interval: Duration,
    submit_timeout: Duration,
    job_retention: Duration,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<String>>,
    jobs: HashMap<String, JobEntry>,
    running: HashMap<String, u64>,
    workers: BTreeMap<String, Vec<String>>,
}

#[derive(Debug)]
struct JobEntry {
    function_name: String,
    params: JobParams,
    state: JobState,
    result: Option<String>,
    timeout_seconds: Option<u64>,
    finished_at: Option<Instant>,
}

impl BrokerState {
    /// 删除结束超过 `retention` 的任务
    fn evict_finished(&mut self, retention: Duration) {
        let now = Instant::now();
        let before = self.jobs.len();
        self.jobs.retain(|_, entry| match entry.finished_at {
            Some(at) => now.duration_since(at) < retention,
            None => true,
        });
        let evicted = before - self.jobs.len();
        if evicted > 0 {
            debug!("Evicted {} finished jobs", evicted);
        }
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_millis(50), Duration::from_secs(30))
    }

    /// `poll_interval` 用于非后台提交时轮询任务状态
    pub fn with_timeouts(poll_interval: Duration, submit_timeout: Duration) -> Self {
        info!("Creating in-memory job queue");
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            notify: Arc::new(Notify::new()),
            poll_interval,
            submit_timeout,
            job_retention: Duration::from_secs(24 * 3600),
        }
    }

    /// 已结束的任务保留这么久，之后状态查询返回 `unknown`
    pub fn with_job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = retention;
        self
    }

    /// 某个函数下排队中的任务数
    pub async fn queued_count(&self, function_name: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(function_name).map_or(0, VecDeque::len)
    }

    async fn try_take(&self, functions: &[String]) -> Option<QueuedJob> {
        let mut state = self.state.lock().await;
        for function in functions {
            let Some(job_id) = state.queues.get_mut(function).and_then(VecDeque::pop_front) else {
                continue;
            };
            let Some(entry) = state.jobs.get_mut(&job_id) else {
                continue;
            };
            entry.state = JobState::Running;
            let job = QueuedJob {
                id: job_id,
                function_name: entry.function_name.clone(),
                params: entry.params.clone(),
                timeout_seconds: entry.timeout_seconds,
            };
            *state.running.entry(function.clone()).or_default() += 1;
            return Some(job);
        }
        None
    }

    async fn finish(
        &self,
        job_id: &str,
        job_state: JobState,
        result: Option<String>,
    ) -> FanoutResult<()> {
        let mut state = self.state.lock().await;
        state.evict_finished(self.job_retention);
        let entry = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| FanoutError::JobNotFound {
                uid: job_id.to_string(),
            })?;
        let was_running = entry.state == JobState::Running;
        entry.state = job_state;
        entry.result = result;
        entry.finished_at = Some(Instant::now());
        let function_name = entry.function_name.clone();

        if was_running {
            if let Some(count) = state.running.get_mut(&function_name) {
                *count = count.saturating_sub(1);
            }
        }
        debug!("Job {} finished with state {}", job_id, job_state);
        Ok(())
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn submit(&self, request: SubmitRequest) -> FanoutResult<JobHandle> {
        let id = request
            .unique_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        {
            let mut state = self.state.lock().await;
            state.evict_finished(self.job_retention);
            if let Some(existing) = state.jobs.get(&id) {
                if !existing.state.is_terminal() {
                    debug!("Job {} already queued, coalescing submission", id);
                    return Ok(JobHandle {
                        id,
                        state: existing.state,
                    });
                }
            }

            state.jobs.insert(
                id.clone(),
                JobEntry {
                    function_name: request.function_name.clone(),
                    params: request.params,
                    state: JobState::Submitted,
                    result: None,
                    timeout_seconds: request.timeout_seconds,
                    finished_at: None,
                },
            );
            state
                .queues
                .entry(request.function_name.clone())
                .or_default()
                .push_back(id.clone());
        }
        self.notify.notify_one();
        debug!("Job {} queued for function {}", id, request.function_name);

        if request.background {
            return Ok(JobHandle {
                id,
                state: JobState::Submitted,
            });
        }

        let status = await_terminal(self, &id, self.poll_interval, self.submit_timeout).await?;
        Ok(JobHandle {
            id,
            state: status.state,
        })
    }

    async fn status(&self, job_id: &str) -> FanoutResult<BrokerJobStatus> {
        let mut state = self.state.lock().await;
        state.evict_finished(self.job_retention);
        Ok(match state.jobs.get(job_id) {
            Some(entry) => BrokerJobStatus {
                id: job_id.to_string(),
                state: entry.state,
                result: entry.result.clone(),
            },
            None => BrokerJobStatus::unknown(job_id),
        })
    }

    async fn admin_status(&self) -> FanoutResult<AdminStatus> {
        let state = self.state.lock().await;

        let mut functions: BTreeSet<&String> = state.queues.keys().collect();
        functions.extend(state.workers.values().flatten());

        let queue_status = functions
            .into_iter()
            .map(|function| FunctionStatus {
                function: function.clone(),
                queued: state.queues.get(function).map_or(0, |q| q.len() as u64),
                running: state.running.get(function).copied().unwrap_or(0),
                available_workers: state
                    .workers
                    .values()
                    .filter(|fs| fs.contains(function))
                    .count() as u64,
            })
            .collect();

        let workers = state
            .workers
            .iter()
            .map(|(worker_id, functions)| WorkerEntry {
                worker_id: worker_id.clone(),
                functions: functions.clone(),
            })
            .collect();

        Ok(AdminStatus {
            queue_status,
            version: format!("in-memory {}", env!("CARGO_PKG_VERSION")),
            workers,
        })
    }
}

#[async_trait]
impl WorkerChannel for InMemoryJobQueue {
    async fn register_worker(&self, worker_id: &str, functions: &[String]) -> FanoutResult<()> {
        let mut state = self.state.lock().await;
        state
            .workers
            .insert(worker_id.to_string(), functions.to_vec());
        Ok(())
    }

    async fn unregister_worker(&self, worker_id: &str) -> FanoutResult<()> {
        let mut state = self.state.lock().await;
        state.workers.remove(worker_id);
        Ok(())
    }

    async fn grab_job(
        &self,
        functions: &[String],
        wait: Duration,
    ) -> FanoutResult<Option<QueuedJob>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(job) = self.try_take(functions).await {
                return Ok(Some(job));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    async fn send_work_complete(&self, job_id: &str, result: &str) -> FanoutResult<()> {
        self.finish(job_id, JobState::Complete, Some(result.to_string()))
            .await
    }

    async fn send_work_fail(&self, job_id: &str, detail: &str) -> FanoutResult<()> {
        self.finish(job_id, JobState::Failed, Some(detail.to_string()))
            .await
    }

    async fn send_work_timeout(&self, job_id: &str) -> FanoutResult<()> {
        self.finish(job_id, JobState::TimedOut, None).await
    }
}
