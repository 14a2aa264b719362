use async_trait::async_trait;
use fanout_core::{config::NodesConfig, traits::NodeDirectory, FanoutResult};

/// 配置文件中列出的固定节点列表
#[derive(Debug, Clone, Default)]
pub struct StaticNodeDirectory {
    nodes: Vec<String>,
}

impl StaticNodeDirectory {
    pub fn new(nodes: Vec<String>) -> Self {
        Self { nodes }
    }

    pub fn from_config(config: &NodesConfig) -> Self {
        Self::new(config.active.clone())
    }
}

#[async_trait]
impl NodeDirectory for StaticNodeDirectory {
    async fn active_nodes(&self) -> FanoutResult<Vec<String>> {
        Ok(self.nodes.clone())
    }
}
