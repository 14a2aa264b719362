//! Worker side of the fan-out system
//!
//! Job functions, the per-process job loop, timing trackers and the
//! process pool that runs several worker processes under one group.

pub mod function;
pub mod lifecycle;
pub mod runtime;
#[cfg(unix)]
pub mod supervisor;
pub mod tracker;

pub use function::{builtin_function, EchoFunction, FunctionRegistry, JobFunction};
pub use lifecycle::{LifecycleEmitter, LifecycleEvent, LifecycleListener};
pub use runtime::{default_worker_id, local_node, JobOutcome, WorkerRuntime};
#[cfg(unix)]
pub use supervisor::{ExeLauncher, ProcessSupervisor, WorkerLauncher};
pub use tracker::{CacheJobTracker, JobTracker, StoreJobTracker};
