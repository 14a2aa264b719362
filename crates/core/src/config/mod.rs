//! 配置管理
//!
//! 配置按默认值、TOML配置文件、`FANOUT__` 前缀环境变量的顺序叠加。
//!
//! | 配置项                      | 含义                               |
//! |-----------------------------|------------------------------------|
//! | `main.queue_server`         | 任务队列地址                       |
//! | `main.job_delete_timeout`   | 单次分发任务在缓存中的保留秒数     |
//! | `cache.server`              | 缓存地址                           |
//! | `cache.lock_expire`         | 锁过期分钟数                       |
//! | `database.url`              | 跟踪数据库地址                     |
//! | `nodes.active`              | 活跃节点列表                       |
//! | `worker.*`                  | Worker进程池与任务执行参数         |
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use fanout_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/fanout.toml")).expect("配置加载失败");
//! println!("队列地址: {}", config.main.queue_server);
//! ```

pub mod models;

pub use models::*;
