use thiserror::Error;

/// 扇出系统错误类型定义
#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("缺少参数: {0}")]
    MissingParameter(String),

    #[error("任务队列连接失败: {0}")]
    BrokerConnection(String),

    #[error("任务ID与幂等键不一致: 期望 {expected}, 实际 {actual}")]
    IdempotencyMismatch { expected: String, actual: String },

    #[error("任务 {uid} 匹配到 {count} 条记录")]
    AmbiguousRecord { uid: String, count: usize },

    #[error("资源已被锁定: {0}")]
    LockUnavailable(String),

    #[error("配置加载失败: {0}")]
    ConfigLoad(String),

    #[error("任务记录未找到: {uid}")]
    JobNotFound { uid: String },

    #[error("没有可用的工作节点")]
    NoActiveNodes,

    #[error("未注册的任务函数: {0}")]
    UnknownFunction(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("缓存错误: {0}")]
    Cache(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("任务执行错误: {0}")]
    JobExecution(String),

    #[error("进程管理错误: {0}")]
    Process(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl FanoutError {
    /// 结构化错误响应中使用的稳定错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            FanoutError::MissingParameter(_) => "missing_parameter",
            FanoutError::BrokerConnection(_) => "broker_connection",
            FanoutError::IdempotencyMismatch { .. } => "idempotency_mismatch",
            FanoutError::AmbiguousRecord { .. } => "ambiguous_record",
            FanoutError::LockUnavailable(_) => "lock_unavailable",
            FanoutError::ConfigLoad(_) => "config_load",
            FanoutError::JobNotFound { .. } => "job_not_found",
            FanoutError::NoActiveNodes => "no_active_nodes",
            FanoutError::UnknownFunction(_) => "unknown_function",
            FanoutError::Database(_) => "database",
            FanoutError::Cache(_) => "cache",
            FanoutError::Serialization(_) => "serialization",
            FanoutError::JobExecution(_) => "job_execution",
            FanoutError::Process(_) => "process",
            FanoutError::Internal(_) => "internal",
        }
    }

    /// 同一调用路径内不可重试的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FanoutError::IdempotencyMismatch { .. }
                | FanoutError::AmbiguousRecord { .. }
                | FanoutError::ConfigLoad(_)
                | FanoutError::BrokerConnection(_)
        )
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        FanoutError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for FanoutError {
    fn from(err: serde_json::Error) -> Self {
        FanoutError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type FanoutResult<T> = std::result::Result<T, FanoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            FanoutError::MissingParameter("server".into()).error_code(),
            "missing_parameter"
        );
        assert_eq!(
            FanoutError::AmbiguousRecord {
                uid: "abc".into(),
                count: 2
            }
            .error_code(),
            "ambiguous_record"
        );
        assert_eq!(FanoutError::NoActiveNodes.error_code(), "no_active_nodes");
    }

    #[test]
    fn test_missing_parameter_message_names_parameter() {
        let err = FanoutError::MissingParameter("ip".into());
        assert!(err.to_string().contains("ip"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_errors() {
        let err = FanoutError::IdempotencyMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert!(err.is_fatal());
        assert!(FanoutError::ConfigLoad("bad".into()).is_fatal());
        assert!(!FanoutError::Cache("miss".into()).is_fatal());
    }
}
