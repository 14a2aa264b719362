use serde::{Deserialize, Serialize};

use crate::{FanoutError, FanoutResult};

/// 函数模板中的节点占位符
pub const NODE_PLACEHOLDER: &str = "{node}";
const LEGACY_PLACEHOLDER: &str = "%s";

/// 按节点参数化的任务函数名，例如 `monitor_{node}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionTemplate {
    template: String,
}

impl FunctionTemplate {
    /// 模板必须恰好包含一个节点占位符，`%s` 视同 `{node}`
    pub fn new(template: impl Into<String>) -> FanoutResult<Self> {
        let template = template.into().replace(LEGACY_PLACEHOLDER, NODE_PLACEHOLDER);
        if template.matches(NODE_PLACEHOLDER).count() != 1 {
            return Err(FanoutError::UnknownFunction(format!(
                "函数模板必须包含一个 {NODE_PLACEHOLDER} 占位符: {template}"
            )));
        }
        Ok(Self { template })
    }

    pub fn bind(&self, node: &str) -> String {
        self.template.replace(NODE_PLACEHOLDER, node)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl TryFrom<String> for FunctionTemplate {
    type Error = FanoutError;

    fn try_from(value: String) -> FanoutResult<Self> {
        Self::new(value)
    }
}

impl From<FunctionTemplate> for String {
    fn from(value: FunctionTemplate) -> Self {
        value.template
    }
}

impl std::fmt::Display for FunctionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}

/// 将可能带占位符的函数名解析为本节点的函数名，无占位符时原样返回
pub fn resolve_function_name(name: &str, node: &str) -> String {
    name.replace(LEGACY_PLACEHOLDER, node)
        .replace(NODE_PLACEHOLDER, node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_node() {
        let template = FunctionTemplate::new("monitor_{node}").unwrap();
        assert_eq!(template.bind("n1"), "monitor_n1");
    }

    #[test]
    fn test_legacy_placeholder() {
        let template = FunctionTemplate::new("ping_%s").unwrap();
        assert_eq!(template.as_str(), "ping_{node}");
        assert_eq!(template.bind("n2"), "ping_n2");
    }

    #[test]
    fn test_template_requires_one_placeholder() {
        assert!(FunctionTemplate::new("monitor").is_err());
        assert!(FunctionTemplate::new("{node}_{node}").is_err());
    }

    #[test]
    fn test_resolve_function_name() {
        assert_eq!(resolve_function_name("echo", "n1"), "echo");
        assert_eq!(resolve_function_name("check_{node}", "n1"), "check_n1");
    }
}
