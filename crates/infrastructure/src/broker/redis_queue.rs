//! Redis backed job queue
//!
//! Key layout (all under the configured prefix):
//!
//! | key                      | type   | content                          |
//! |--------------------------|--------|----------------------------------|
//! | `{p}:queue:{function}`   | list   | queued job ids                   |
//! | `{p}:job:{id}`           | hash   | function, payload, state, result |
//! | `{p}:unique:{unique_id}` | string | job id claimed by a unique id    |
//! | `{p}:functions`          | set    | every function ever seen         |
//! | `{p}:workers`            | hash   | worker id -> functions           |
//! | `{p}:running`            | hash   | function -> running count        |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanout_core::{
    models::{
        AdminStatus, BrokerJobStatus, FunctionStatus, JobHandle, JobState, QueuedJob,
        SubmitRequest, WorkerEntry,
    },
    traits::{await_terminal, JobQueue, WorkerChannel},
    FanoutError, FanoutResult,
};
use redis::aio::ConnectionManager;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

fn broker_error(e: redis::RedisError) -> FanoutError {
    FanoutError::BrokerConnection(e.to_string())
}

/// Pops the next live job id and marks it running in one step.
///
/// Ids whose job hash already expired are dropped. Returns `{id, payload}` or nil.
fn claim_script() -> redis::Script {
    redis::Script::new(
        r#"
        local id = redis.call('LPOP', KEYS[1])
        while id do
            local job_key = ARGV[1] .. id
            local payload = redis.call('HGET', job_key, 'payload')
            if payload then
                redis.call('HSET', job_key, 'state', ARGV[3])
                redis.call('HINCRBY', KEYS[2], ARGV[2], 1)
                return {id, payload}
            end
            id = redis.call('LPOP', KEYS[1])
        end
        return false
        "#,
    )
}

/// Redis job queue shared by dispatchers and workers
pub struct RedisJobQueue {
    client: Arc<redis::Client>,
    key_prefix: String,
    poll_interval: Duration,
    submit_timeout: Duration,
    job_retention: Duration,
}

impl RedisJobQueue {
    /// Connect and verify the server answers PING
    pub async fn new(url: &str, key_prefix: impl Into<String>) -> FanoutResult<Self> {
        info!("Creating Redis job queue with URL: {}", url);

        let client = redis::Client::open(url).map_err(broker_error)?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(broker_error)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(broker_error)?;

        Ok(Self {
            client: Arc::new(client),
            key_prefix: key_prefix.into(),
            poll_interval: Duration::from_millis(200),
            submit_timeout: Duration::from_secs(30),
            job_retention: Duration::from_secs(24 * 3600),
        })
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Queue side records expire after this long
    pub fn with_job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = retention;
        self
    }

    async fn connection(&self) -> FanoutResult<ConnectionManager> {
        self.client
            .get_connection_manager()
            .await
            .map_err(broker_error)
    }

    fn key(&self, kind: &str, name: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, kind, name)
    }

    fn functions_key(&self) -> String {
        format!("{}:functions", self.key_prefix)
    }

    fn workers_key(&self) -> String {
        format!("{}:workers", self.key_prefix)
    }

    fn running_key(&self) -> String {
        format!("{}:running", self.key_prefix)
    }

    async fn read_state(
        &self,
        conn: &mut ConnectionManager,
        job_id: &str,
    ) -> FanoutResult<JobState> {
        let state: Option<String> = redis::cmd("HGET")
            .arg(self.key("job", job_id))
            .arg("state")
            .query_async(conn)
            .await
            .map_err(broker_error)?;
        Ok(state.map_or(JobState::Unknown, |s| JobState::parse(&s)))
    }

    /// Claims `unique_id` for a new job, or returns the live job already holding it
    async fn claim_unique(
        &self,
        conn: &mut ConnectionManager,
        unique_id: &str,
    ) -> FanoutResult<Option<JobHandle>> {
        let unique_key = self.key("unique", unique_id);
        let retention = self.job_retention.as_secs().max(1);

        let claimed: Option<String> = redis::cmd("SET")
            .arg(&unique_key)
            .arg(unique_id)
            .arg("NX")
            .arg("EX")
            .arg(retention)
            .query_async(conn)
            .await
            .map_err(broker_error)?;
        if claimed.is_some() {
            return Ok(None);
        }

        let state = self.read_state(conn, unique_id).await?;
        if state != JobState::Unknown && !state.is_terminal() {
            debug!("Job {} already queued, coalescing submission", unique_id);
            return Ok(Some(JobHandle {
                id: unique_id.to_string(),
                state,
            }));
        }

        let _: () = redis::cmd("SET")
            .arg(&unique_key)
            .arg(unique_id)
            .arg("EX")
            .arg(retention)
            .query_async(conn)
            .await
            .map_err(broker_error)?;
        Ok(None)
    }

    /// Atomically takes the next job of `function` off its queue and marks it running
    async fn claim(
        &self,
        conn: &mut ConnectionManager,
        function: &str,
    ) -> FanoutResult<Option<(String, String)>> {
        claim_script()
            .key(self.key("queue", function))
            .key(self.running_key())
            .arg(format!("{}:job:", self.key_prefix))
            .arg(function)
            .arg(JobState::Running.as_str())
            .invoke_async(conn)
            .await
            .map_err(broker_error)
    }

    async fn finish(
        &self,
        job_id: &str,
        state: JobState,
        result: Option<&str>,
    ) -> FanoutResult<()> {
        let mut conn = self.connection().await?;
        let job_key = self.key("job", job_id);

        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&job_key)
            .query_async(&mut conn)
            .await
            .map_err(broker_error)?;
        let Some(function_name) = fields.get("function") else {
            return Err(FanoutError::JobNotFound {
                uid: job_id.to_string(),
            });
        };
        let was_running = fields.get("state").map(String::as_str) == Some("running");

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(&job_key)
            .arg("state")
            .arg(state.as_str())
            .arg("result")
            .arg(result.unwrap_or(""))
            .ignore();
        if was_running {
            pipe.cmd("HINCRBY")
                .arg(self.running_key())
                .arg(function_name)
                .arg(-1)
                .ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(broker_error)?;

        debug!("Job {} finished with state {}", job_id, state);
        Ok(())
    }

    async fn server_version(&self, conn: &mut ConnectionManager) -> FanoutResult<String> {
        let info: String = redis::cmd("INFO")
            .arg("server")
            .query_async(conn)
            .await
            .map_err(broker_error)?;
        Ok(info
            .lines()
            .find_map(|line| line.strip_prefix("redis_version:"))
            .map(|v| format!("redis {}", v.trim()))
            .unwrap_or_else(|| "redis".to_string()))
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    #[instrument(skip(self, request), fields(function = %request.function_name))]
    async fn submit(&self, request: SubmitRequest) -> FanoutResult<JobHandle> {
        let mut conn = self.connection().await?;

        let id = match &request.unique_id {
            Some(unique_id) => {
                if let Some(existing) = self.claim_unique(&mut conn, unique_id).await? {
                    return Ok(existing);
                }
                unique_id.clone()
            }
            None => Uuid::new_v4().to_string(),
        };

        let job = QueuedJob {
            id: id.clone(),
            function_name: request.function_name.clone(),
            params: request.params,
            timeout_seconds: request.timeout_seconds,
        };
        let payload = serde_json::to_string(&job)?;
        let job_key = self.key("job", &id);

        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(&job_key)
            .ignore()
            .cmd("HSET")
            .arg(&job_key)
            .arg("function")
            .arg(&request.function_name)
            .arg("payload")
            .arg(&payload)
            .arg("state")
            .arg(JobState::Submitted.as_str())
            .ignore()
            .cmd("EXPIRE")
            .arg(&job_key)
            .arg(self.job_retention.as_secs().max(1))
            .ignore()
            .cmd("RPUSH")
            .arg(self.key("queue", &request.function_name))
            .arg(&id)
            .ignore()
            .cmd("SADD")
            .arg(self.functions_key())
            .arg(&request.function_name)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to queue job {}: {}", id, e);
                broker_error(e)
            })?;
        debug!("Job {} queued", id);

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
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.key("job", job_id))
            .query_async(&mut conn)
            .await
            .map_err(broker_error)?;

        if fields.is_empty() {
            return Ok(BrokerJobStatus::unknown(job_id));
        }

        Ok(BrokerJobStatus {
            id: job_id.to_string(),
            state: fields
                .get("state")
                .map_or(JobState::Unknown, |s| JobState::parse(s)),
            result: fields.get("result").filter(|r| !r.is_empty()).cloned(),
        })
    }

    async fn admin_status(&self) -> FanoutResult<AdminStatus> {
        let mut conn = self.connection().await?;

        let mut functions: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.functions_key())
            .query_async(&mut conn)
            .await
            .map_err(broker_error)?;
        functions.sort();

        let running: HashMap<String, i64> = redis::cmd("HGETALL")
            .arg(self.running_key())
            .query_async(&mut conn)
            .await
            .map_err(broker_error)?;
        let raw_workers: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.workers_key())
            .query_async(&mut conn)
            .await
            .map_err(broker_error)?;

        let mut workers: Vec<WorkerEntry> = raw_workers
            .into_iter()
            .map(|(worker_id, functions)| WorkerEntry {
                worker_id,
                functions: functions
                    .split(',')
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
            .collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

        let mut queue_status = Vec::with_capacity(functions.len());
        for function in functions {
            let queued: u64 = redis::cmd("LLEN")
                .arg(self.key("queue", &function))
                .query_async(&mut conn)
                .await
                .map_err(broker_error)?;
            queue_status.push(FunctionStatus {
                running: running.get(&function).copied().unwrap_or(0).max(0) as u64,
                available_workers: workers
                    .iter()
                    .filter(|w| w.functions.contains(&function))
                    .count() as u64,
                queued,
                function,
            });
        }

        let version = self.server_version(&mut conn).await?;

        Ok(AdminStatus {
            queue_status,
            version,
            workers,
        })
    }
}

#[async_trait]
impl WorkerChannel for RedisJobQueue {
    async fn register_worker(&self, worker_id: &str, functions: &[String]) -> FanoutResult<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.cmd("HSET")
            .arg(self.workers_key())
            .arg(worker_id)
            .arg(functions.join(","))
            .ignore();
        if !functions.is_empty() {
            pipe.cmd("SADD")
                .arg(self.functions_key())
                .arg(functions)
                .ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(broker_error)?;
        info!("Worker {} registered for {:?}", worker_id, functions);
        Ok(())
    }

    async fn unregister_worker(&self, worker_id: &str) -> FanoutResult<()> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("HDEL")
            .arg(self.workers_key())
            .arg(worker_id)
            .query_async(&mut conn)
            .await
            .map_err(broker_error)?;
        Ok(())
    }

    async fn grab_job(
        &self,
        functions: &[String],
        wait: Duration,
    ) -> FanoutResult<Option<QueuedJob>> {
        let mut conn = self.connection().await?;
        let deadline = Instant::now() + wait;

        loop {
            for function in functions {
                while let Some((job_id, payload)) = self.claim(&mut conn, function).await? {
                    match serde_json::from_str::<QueuedJob>(&payload) {
                        Ok(job) => return Ok(Some(job)),
                        Err(e) => {
                            error!("Job {} has an unreadable payload: {}", job_id, e);
                            let detail = format!("无法解析任务内容: {e}");
                            self.finish(&job_id, JobState::Failed, Some(&detail)).await?;
                        }
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            sleep(remaining.min(self.poll_interval)).await;
        }
    }

    async fn send_work_complete(&self, job_id: &str, result: &str) -> FanoutResult<()> {
        self.finish(job_id, JobState::Complete, Some(result)).await
    }

    async fn send_work_fail(&self, job_id: &str, detail: &str) -> FanoutResult<()> {
        self.finish(job_id, JobState::Failed, Some(detail)).await
    }

    async fn send_work_timeout(&self, job_id: &str) -> FanoutResult<()> {
        self.finish(job_id, JobState::TimedOut, None).await
    }
}
