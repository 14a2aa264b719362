pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod time;
pub mod traits;

pub use errors::*;
pub use models::{
    AdminStatus, BrokerJobStatus, JobHandle, JobInfo, JobPacket, JobParams, JobRecord, JobState,
    JobTiming, QueuedJob, StatusLookup, SubmitRequest,
};
pub use traits::{CacheService, JobQueue, NodeDirectory, TrackingStore, WorkerChannel};
