//! Job queue backends

pub mod factory;
pub mod in_memory;
pub mod redis_queue;

pub use factory::*;
pub use in_memory::*;
pub use redis_queue::*;
