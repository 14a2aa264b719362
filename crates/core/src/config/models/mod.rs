pub mod app_config;
pub mod broker;
pub mod database;
pub mod observability;
pub mod worker;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use broker::{CacheConfig, MainConfig};
pub use database::DatabaseConfig;
pub use observability::ObservabilityConfig;
pub use worker::{NodesConfig, TrackerKind, WorkerConfig};
