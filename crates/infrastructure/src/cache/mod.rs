//! Cache backends for job tracking and locks
//!
//! Provides the Redis-backed `CacheService`, a process-local fallback and the
//! tracking cache that stores single-dispatch job records.

pub mod factory;
pub mod in_memory;
pub mod manager;
pub mod tracking;

pub use factory::*;
pub use in_memory::*;
pub use manager::*;
pub use tracking::*;
