use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FanoutError, FanoutResult};

pub const PARAM_SERVER: &str = "server";
pub const PARAM_NODE: &str = "node";
pub const PARAM_NODES: &str = "nodes";
pub const PARAM_SETUP_TIME: &str = "setup_time";
pub const PARAM_CALLBACK_TYPE: &str = "callback_type";
pub const PARAM_JOB_PACKET_ID: &str = "job_packet_id";

/// 任务参数
///
/// 按键名排序的参数映射，序列化结果对相同内容总是一致，
/// 因此可以直接用于计算幂等键。请求层解析出的入站参数也使用此类型。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParams(BTreeMap<String, Value>);

impl JobParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 以字符串形式读取参数，数字等标量会被转换为字符串
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// 校验必填参数，返回第一个缺失的参数名
    pub fn require<S: AsRef<str>>(&self, names: &[S]) -> FanoutResult<()> {
        match names.iter().find(|name| !self.contains(name.as_ref())) {
            Some(missing) => Err(FanoutError::MissingParameter(missing.as_ref().to_string())),
            None => Ok(()),
        }
    }

    /// 规范化序列化，用作任务负载和幂等键的输入
    pub fn to_bytes(&self) -> FanoutResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }
}

impl FromIterator<(String, Value)> for JobParams {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for JobParams {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect()
    }
}
