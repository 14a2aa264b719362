pub mod broker;
pub mod cache;
pub mod database;
pub mod lock;
pub mod metrics;

pub use broker::{InMemoryJobQueue, JobQueueFactory, QueueBackend, RedisJobQueue};
pub use cache::{
    create_cache_service, job_cache_key, InMemoryCache, RedisCacheManager, TrackingCache,
};
pub use database::{DatabaseManager, DatabaseType, PostgresTrackingStore, SqliteTrackingStore};
pub use lock::LockManager;
pub use self::metrics::MetricsCollector;
