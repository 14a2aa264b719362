use std::collections::BTreeMap;
use std::sync::Arc;

use fanout_core::{
    models::{
        FunctionTemplate, JobInfo, JobParams, NewJobPacket, NewJobRecord, SubmitRequest,
        PARAM_SERVER,
    },
    time::{format_time, now},
    traits::{JobQueue, NodeDirectory, TrackingStore},
    FanoutError, FanoutResult,
};
use fanout_infrastructure::MetricsCollector;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::job_dispatcher::log_submission;
use crate::params::{stamp, NodeParamsBuilder};

/// 扇出失败时返回给调用方的错误描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutErrorBody {
    pub code: String,
    pub message: String,
    /// 缺失的参数名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl From<&FanoutError> for FanoutErrorBody {
    fn from(err: &FanoutError) -> Self {
        let parameter = match err {
            FanoutError::MissingParameter(name) => Some(name.clone()),
            _ => None,
        };
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
            parameter,
        }
    }
}

/// 扇出响应，`job` 以节点ID为键
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FanoutResponse {
    pub result: bool,
    pub job: BTreeMap<String, JobInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FanoutErrorBody>,
}

impl FanoutResponse {
    /// 缺失的参数名，其他错误或成功时为 `None`
    pub fn missing_parameter(&self) -> Option<&str> {
        self.error.as_ref()?.parameter.as_deref()
    }
}

/// 扇出分发
///
/// 一次请求生成一个任务包，活跃节点各得到一个任务。所有错误都转换为
/// `result = false` 的结构化响应。任务包与任务行不在同一事务中写入：
/// 第k个节点失败时，前面已写入的行和已提交的任务保持原样。
pub struct FanoutCoordinator {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn TrackingStore>,
    nodes: Arc<dyn NodeDirectory>,
}

impl FanoutCoordinator {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn TrackingStore>,
        nodes: Arc<dyn NodeDirectory>,
    ) -> Self {
        Self {
            queue,
            store,
            nodes,
        }
    }

    #[instrument(skip(self, request_params, required), fields(function = %function))]
    pub async fn submit<S: AsRef<str>>(
        &self,
        request_params: &JobParams,
        function: &FunctionTemplate,
        required: &[S],
        packet_type: &str,
    ) -> FanoutResponse {
        let mut response = FanoutResponse::default();

        match self
            .fan_out(request_params, function, required, packet_type, &mut response)
            .await
        {
            Ok(()) => response.result = true,
            Err(e) => {
                match &e {
                    FanoutError::MissingParameter(name) => warn!("缺少参数: {}", name),
                    _ => error!(
                        "扇出失败 (任务包 {:?}, 已提交 {} 个任务): {}",
                        response.packet_id,
                        response.job.len(),
                        e
                    ),
                }
                response.result = false;
                response.error = Some(FanoutErrorBody::from(&e));
            }
        }

        response
    }

    async fn fan_out<S: AsRef<str>>(
        &self,
        request_params: &JobParams,
        function: &FunctionTemplate,
        required: &[S],
        packet_type: &str,
        response: &mut FanoutResponse,
    ) -> FanoutResult<()> {
        request_params.require(required)?;
        request_params.require(&[PARAM_SERVER])?;
        let server = request_params
            .get_string(PARAM_SERVER)
            .ok_or_else(|| FanoutError::MissingParameter(PARAM_SERVER.to_string()))?;

        let setup_time = now();
        let mut params = request_params.clone();
        stamp(&mut params, packet_type, &setup_time);
        let setup_time_text = format_time(&setup_time);

        let nodes = self.nodes.active_nodes().await?;
        if nodes.is_empty() {
            return Err(FanoutError::NoActiveNodes);
        }

        let packet_id = self
            .store
            .insert_packet(&NewJobPacket {
                packet_type: packet_type.to_string(),
                server: server.clone(),
                setup_time,
                nodes: nodes.clone(),
            })
            .await?;
        response.packet_id = Some(packet_id);
        MetricsCollector::record_packet_created();
        info!("New job packet ID=[#{}]", packet_id);

        let builder = NodeParamsBuilder::new(params, packet_id, &nodes);
        for node in &nodes {
            info!("set job for node=[#{}]", node);
            let node_params = builder.build(node);

            let handle = self
                .queue
                .submit(SubmitRequest::background(
                    function.bind(node),
                    node_params.clone(),
                ))
                .await?;
            MetricsCollector::record_job_submitted("fanout");

            self.store
                .insert_job(&NewJobRecord {
                    packet_id,
                    job_id: handle.id.clone(),
                    job_type: packet_type.to_string(),
                    server: server.clone(),
                    node: node.clone(),
                    setup_time: now(),
                })
                .await?;

            log_submission(&handle);
            response.job.insert(
                node.clone(),
                JobInfo::new(&handle, setup_time_text.clone(), node_params),
            );
        }

        Ok(())
    }
}
