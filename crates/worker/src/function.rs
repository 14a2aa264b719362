use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fanout_core::{
    models::{resolve_function_name, JobParams, NODE_PLACEHOLDER},
    FanoutError, FanoutResult,
};
use tracing::debug;

/// Worker上注册的任务函数
///
/// 返回值作为任务结果回传给队列；返回错误时任务以失败结束。
#[async_trait]
pub trait JobFunction: Send + Sync {
    async fn run(&self, params: &JobParams) -> FanoutResult<String>;
}

/// 原样返回任务参数
pub struct EchoFunction;

#[async_trait]
impl JobFunction for EchoFunction {
    async fn run(&self, params: &JobParams) -> FanoutResult<String> {
        Ok(serde_json::to_string(params)?)
    }
}

/// 按名称查找内置函数，`echo_{node}` 这样的模板按去掉占位符后的名称查找
pub fn builtin_function(template: &str) -> Option<Arc<dyn JobFunction>> {
    let base = template
        .replace(NODE_PLACEHOLDER, "")
        .replace("%s", "")
        .trim_end_matches(['_', '-', '.'])
        .to_string();
    match base.as_str() {
        "echo" => Some(Arc::new(EchoFunction)),
        _ => None,
    }
}

/// 本节点的函数注册表
///
/// 注册时函数名中的节点占位符替换为本节点ID，Worker只从这些名称对应的队列领取任务。
pub struct FunctionRegistry {
    node: String,
    functions: BTreeMap<String, Arc<dyn JobFunction>>,
}

impl FunctionRegistry {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            functions: BTreeMap::new(),
        }
    }

    /// 按配置中的函数模板注册内置函数
    pub fn with_builtins<S: AsRef<str>>(node: impl Into<String>, templates: &[S]) -> FanoutResult<Self> {
        let mut registry = Self::new(node);
        for template in templates {
            let template = template.as_ref();
            let function = builtin_function(template)
                .ok_or_else(|| FanoutError::UnknownFunction(template.to_string()))?;
            registry.register(template, function);
        }
        Ok(registry)
    }

    /// 注册函数，返回解析后的函数名
    pub fn register(&mut self, name: &str, function: Arc<dyn JobFunction>) -> String {
        let resolved = resolve_function_name(name, &self.node);
        debug!("注册任务函数: {} -> {}", name, resolved);
        self.functions.insert(resolved.clone(), function);
        resolved
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_resolve_to_node() {
        let registry =
            FunctionRegistry::with_builtins("n1", &["echo_{node}", "echo"]).unwrap();
        assert_eq!(registry.function_names(), vec!["echo", "echo_n1"]);
        assert!(registry.get("echo_n1").is_some());
        assert!(registry.get("echo_n2").is_none());
    }

    #[test]
    fn test_unknown_builtin() {
        let err = FunctionRegistry::with_builtins("n1", &["monitor_{node}"])
            .err()
            .unwrap();
        assert!(matches!(err, FanoutError::UnknownFunction(name) if name == "monitor_{node}"));
    }

    #[tokio::test]
    async fn test_echo_returns_params() {
        let params = JobParams::from([("server", "s1")]);
        let output = EchoFunction.run(&params).await.unwrap();
        let decoded: JobParams = serde_json::from_str(&output).unwrap();
        assert_eq!(decoded, params);
    }
}
