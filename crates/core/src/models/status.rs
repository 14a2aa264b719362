use serde::{Deserialize, Serialize};

use super::job::{BrokerJobStatus, JobInfo, JobState};
use super::packet::{JobPacket, JobRecord};

/// 状态查询结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LookupState {
    /// 队列报告任务已结束，`failed` 表示以失败告终
    Complete {
        result: Option<String>,
        failed: bool,
    },
    TimedOut,
    /// 队列无法识别该任务
    ConnectionFailed,
    InProgress,
    /// 缓存与数据库中都没有该任务
    Unknown,
}

impl LookupState {
    /// 将队列状态映射为查询结论
    pub fn from_broker(status: &BrokerJobStatus) -> Self {
        match status.state {
            JobState::Complete => LookupState::Complete {
                result: status.result.clone(),
                failed: false,
            },
            JobState::Failed => LookupState::Complete {
                result: status.result.clone(),
                failed: true,
            },
            JobState::TimedOut => LookupState::TimedOut,
            JobState::Unknown => LookupState::ConnectionFailed,
            JobState::Submitted | JobState::Running => LookupState::InProgress,
        }
    }
}

/// 查询到的任务记录，来源于缓存或数据库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TrackedJob {
    Cache(JobInfo),
    Store(JobRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupParams {
    pub uid: String,
}

/// 状态查询响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLookup {
    pub job_data: Option<TrackedJob>,
    pub params: LookupParams,
    pub status: LookupState,
}

impl StatusLookup {
    pub fn unknown(uid: impl Into<String>) -> Self {
        Self {
            job_data: None,
            params: LookupParams { uid: uid.into() },
            status: LookupState::Unknown,
        }
    }
}

/// 任务包查询响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketStatus {
    pub packet: JobPacket,
    pub jobs: Vec<JobRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: JobState, result: Option<&str>) -> BrokerJobStatus {
        BrokerJobStatus {
            id: "job".into(),
            state,
            result: result.map(str::to_string),
        }
    }

    #[test]
    fn test_broker_status_mapping() {
        assert_eq!(
            LookupState::from_broker(&status(JobState::Complete, Some("42"))),
            LookupState::Complete {
                result: Some("42".into()),
                failed: false
            }
        );
        assert_eq!(
            LookupState::from_broker(&status(JobState::TimedOut, None)),
            LookupState::TimedOut
        );
        assert_eq!(
            LookupState::from_broker(&status(JobState::Unknown, None)),
            LookupState::ConnectionFailed
        );
        assert_eq!(
            LookupState::from_broker(&status(JobState::Running, None)),
            LookupState::InProgress
        );
        assert!(matches!(
            LookupState::from_broker(&status(JobState::Failed, Some("boom"))),
            LookupState::Complete { failed: true, .. }
        ));
    }

    #[test]
    fn test_unknown_lookup_serialization() {
        let json = serde_json::to_value(StatusLookup::unknown("nope")).unwrap();
        assert_eq!(json["params"]["uid"], "nope");
        assert_eq!(json["status"]["state"], "unknown");
        assert!(json["job_data"].is_null());
    }
}
