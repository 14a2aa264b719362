//! Dispatch side of the fan-out system
//!
//! Single-job dispatch, per-node fan-out into job packets and status lookups.

pub mod fanout;
pub mod job_dispatcher;
pub mod node_directory;
pub mod params;
pub mod status_tracker;

pub use fanout::{FanoutCoordinator, FanoutErrorBody, FanoutResponse};
pub use job_dispatcher::{DispatchResponse, JobDispatcher};
pub use node_directory::StaticNodeDirectory;
pub use params::{idempotency_key, stamp, NodeParamsBuilder};
pub use status_tracker::StatusTracker;
