pub mod cache;
pub mod job_queue;
pub mod node_directory;
pub mod repository;

pub use cache::*;
pub use job_queue::*;
pub use node_directory::*;
pub use repository::*;
