//! # 数据模型
//!
//! 定义任务扇出系统的核心数据结构。
//!
//! ## 核心模型
//!
//! ### JobParams - 任务参数
//! 按键名排序的参数映射，扇出时每个节点在共享参数之上覆盖节点相关字段。
//!
//! ### JobInfo / JobHandle - 任务
//! 队列返回的任务句柄以及缓存中的任务记录。
//!
//! ### JobPacket / JobRecord - 任务包
//! 数据库中的 `job_packet` 与 `job` 表行。
//!
//! ### StatusLookup - 状态查询
//! 先查缓存再查数据库，最后结合队列状态给出结论。
//!
//! ## 状态流转
//!
//! ```text
//! submitted → running → complete
//!                ↓
//!          failed / timed_out
//! ```
//!
//! ## 数据库映射
//!
//! ### job_packet 表
//! - `id` - 主键，插入时生成
//! - `type`、`server`、`setup_time`
//! - `nodes` - 以 `", "` 连接的节点列表
//! - `retry`、`result`、`processed` - 外部对账字段
//!
//! ### job 表
//! - `packet_id` - 所属任务包
//! - `job_id` - 队列分配的任务ID
//! - `start_time`、`end_time`、`run_time` - 由Worker在完成时写入

pub mod admin;
pub mod function;
pub mod job;
pub mod packet;
pub mod params;
pub mod status;

pub use admin::*;
pub use function::*;
pub use job::*;
pub use packet::*;
pub use params::*;
pub use status::*;
