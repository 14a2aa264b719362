use serde::{Deserialize, Serialize};

/// Worker记录任务计时的后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Cache,
    #[default]
    Store,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 进程池大小
    pub processes: usize,
    /// 本机节点ID，未配置时使用主机名
    pub node: Option<String>,
    /// 函数模板，`{node}` 会被替换为节点ID
    pub functions: Vec<String>,
    pub tracker: TrackerKind,
    pub poll_interval_ms: u64,
    pub job_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            processes: 4,
            node: None,
            functions: vec!["echo".to_string()],
            tracker: TrackerKind::default(),
            poll_interval_ms: 500,
            job_timeout_seconds: 300,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processes == 0 {
            return Err(anyhow::anyhow!("Worker进程数必须大于0"));
        }

        if self.functions.is_empty() {
            return Err(anyhow::anyhow!("Worker函数列表不能为空"));
        }

        if matches!(&self.node, Some(node) if node.trim().is_empty()) {
            return Err(anyhow::anyhow!("节点ID不能为空字符串"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("任务轮询间隔必须大于0"));
        }

        if self.job_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 静态节点目录（`[nodes]`）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesConfig {
    pub active: Vec<String>,
}

impl NodesConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.active {
            if node.trim().is_empty() {
                return Err(anyhow::anyhow!("节点ID不能为空"));
            }
            if node.contains(',') {
                return Err(anyhow::anyhow!("节点ID不能包含逗号: {node}"));
            }
            if !seen.insert(node.as_str()) {
                return Err(anyhow::anyhow!("节点ID重复: {node}"));
            }
        }
        Ok(())
    }
}
