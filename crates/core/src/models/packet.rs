use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 节点列表在 `job_packet.nodes` 列中的分隔符
pub const NODES_SEPARATOR: &str = ", ";

/// 任务包
///
/// 一次扇出请求生成的任务组，每个目标节点对应一个子任务。
/// `retry`、`result`、`processed` 由外部的对账逻辑维护。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPacket {
    pub id: i64,
    pub packet_type: String,
    pub server: String,
    pub setup_time: NaiveDateTime,
    pub nodes: String,
    pub retry: i32,
    pub result: i32,
    pub processed: bool,
}

/// 待插入的任务包
#[derive(Debug, Clone)]
pub struct NewJobPacket {
    pub packet_type: String,
    pub server: String,
    pub setup_time: NaiveDateTime,
    pub nodes: Vec<String>,
}

impl NewJobPacket {
    pub fn nodes_column(&self) -> String {
        self.nodes.join(NODES_SEPARATOR)
    }
}

/// `job` 表中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub packet_id: i64,
    pub job_id: String,
    pub job_type: String,
    pub server: String,
    pub node: String,
    pub setup_time: NaiveDateTime,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub run_time: i64,
    pub result: String,
    pub processed: bool,
}

/// 待插入的任务行，计时字段置零
#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub packet_id: i64,
    pub job_id: String,
    pub job_type: String,
    pub server: String,
    pub node: String,
    pub setup_time: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now;

    #[test]
    fn test_nodes_column_joins_in_order() {
        let packet = NewJobPacket {
            packet_type: "ping".into(),
            server: "s1".into(),
            setup_time: now(),
            nodes: vec!["n1".into(), "n2".into()],
        };
        assert_eq!(packet.nodes_column(), "n1, n2");
    }
}
