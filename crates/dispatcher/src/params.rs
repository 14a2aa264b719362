//! 任务参数的构造：时间戳、回调类型、幂等键和按节点派生

use chrono::NaiveDateTime;
use fanout_core::{
    models::{
        JobParams, PARAM_CALLBACK_TYPE, PARAM_JOB_PACKET_ID, PARAM_NODE, PARAM_NODES,
        PARAM_SETUP_TIME,
    },
    time::format_time,
    FanoutResult,
};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// 写入 `setup_time` 和 `callback_type`
pub fn stamp(params: &mut JobParams, callback_type: &str, setup_time: &NaiveDateTime) {
    params.insert(PARAM_SETUP_TIME, format_time(setup_time));
    params.insert(PARAM_CALLBACK_TYPE, callback_type);
}

/// 对规范化序列化后的参数计算SHA-256，十六进制输出
pub fn idempotency_key(params: &JobParams) -> FanoutResult<String> {
    let hash = Sha256::digest(params.to_bytes()?);
    Ok(format!("{hash:x}"))
}

/// 从共享参数派生每个节点的参数
///
/// 共享参数在构造后不再修改，每次 `build` 返回一份独立的副本。
#[derive(Debug, Clone)]
pub struct NodeParamsBuilder {
    shared: JobParams,
}

impl NodeParamsBuilder {
    pub fn new(mut shared: JobParams, packet_id: i64, nodes: &[String]) -> Self {
        shared.insert(PARAM_JOB_PACKET_ID, packet_id);
        shared.insert(
            PARAM_NODES,
            Value::Array(nodes.iter().cloned().map(Value::String).collect()),
        );
        Self { shared }
    }

    pub fn shared(&self) -> &JobParams {
        &self.shared
    }

    pub fn build(&self, node: &str) -> JobParams {
        self.shared.clone().with(PARAM_NODE, node)
    }
}
