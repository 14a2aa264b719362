use async_trait::async_trait;

use crate::FanoutResult;

/// 工作节点目录，由外部提供当前活跃的节点列表
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    async fn active_nodes(&self) -> FanoutResult<Vec<String>>;
}
