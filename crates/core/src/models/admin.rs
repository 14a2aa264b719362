use serde::{Deserialize, Serialize};

/// 单个任务函数的队列状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionStatus {
    pub function: String,
    pub queued: u64,
    pub running: u64,
    pub available_workers: u64,
}

/// 已注册的Worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub worker_id: String,
    pub functions: Vec<String>,
}

/// 队列管理状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStatus {
    pub queue_status: Vec<FunctionStatus>,
    pub version: String,
    pub workers: Vec<WorkerEntry>,
}
