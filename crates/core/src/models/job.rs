use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::params::JobParams;
use crate::time::{format_time, run_time_seconds};

/// 任务状态
///
/// `Complete`、`Failed`、`TimedOut` 为终止状态，本系统不会自动重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Running,
    Complete,
    Failed,
    TimedOut,
    Unknown,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "submitted" => JobState::Submitted,
            "running" => JobState::Running,
            "complete" => JobState::Complete,
            "failed" => JobState::Failed,
            "timed_out" => JobState::TimedOut,
            _ => JobState::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::Failed | JobState::TimedOut
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 提交到任务队列的请求
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub function_name: String,
    pub params: JobParams,
    pub background: bool,
    /// 客户端指定的唯一ID，队列应以此去重
    pub unique_id: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl SubmitRequest {
    pub fn background(function_name: impl Into<String>, params: JobParams) -> Self {
        Self {
            function_name: function_name.into(),
            params,
            background: true,
            unique_id: None,
            timeout_seconds: None,
        }
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }
}

/// 队列在提交时返回的任务句柄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub state: JobState,
}

/// Worker从队列领取到的任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
    pub function_name: String,
    pub params: JobParams,
    pub timeout_seconds: Option<u64>,
}

/// 队列侧看到的任务状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerJobStatus {
    pub id: String,
    pub state: JobState,
    pub result: Option<String>,
}

impl BrokerJobStatus {
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: JobState::Unknown,
            result: None,
        }
    }
}

/// 提交后用于日志的状态描述，尚未到达终止状态时返回 `None`
pub fn describe_request_status(status: &BrokerJobStatus) -> Option<String> {
    match status.state {
        JobState::Complete | JobState::Failed => Some(format!(
            "Job {} finished!  Result: {} - {}",
            status.id,
            status.state,
            status.result.as_deref().unwrap_or("")
        )),
        JobState::TimedOut => Some(format!("Job {} timed out!", status.id)),
        JobState::Unknown => Some(format!("Job {} connection failed!", status.id)),
        JobState::Submitted | JobState::Running => None,
    }
}

/// 任务信息
///
/// 缓存中保存的任务记录，也是分发响应中每个任务的展示形式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub state: JobState,
    pub setup_time: String,
    pub params: JobParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_time: Option<i64>,
}

impl JobInfo {
    pub fn new(handle: &JobHandle, setup_time: impl Into<String>, params: JobParams) -> Self {
        Self {
            id: handle.id.clone(),
            state: handle.state,
            setup_time: setup_time.into(),
            params,
            start_time: None,
            end_time: None,
            run_time: None,
        }
    }

    /// 合并计时字段
    pub fn apply_timing(&mut self, timing: &JobTiming) {
        self.start_time = Some(format_time(&timing.start_time));
        self.end_time = Some(format_time(&timing.end_time));
        self.run_time = Some(timing.run_time);
    }
}

/// 任务完成时计算出的计时信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTiming {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// 秒
    pub run_time: i64,
}

impl JobTiming {
    pub fn between(start_time: NaiveDateTime, end_time: NaiveDateTime) -> Self {
        Self {
            start_time,
            end_time,
            run_time: run_time_seconds(&start_time, &end_time),
        }
    }
}
