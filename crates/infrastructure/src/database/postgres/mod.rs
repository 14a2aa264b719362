pub mod tracking_store;

pub use tracking_store::PostgresTrackingStore;
