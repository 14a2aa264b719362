//! Metrics for job submission, execution and locking
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder.

use metrics::{counter, histogram};

pub const JOBS_SUBMITTED_TOTAL: &str = "fanout_jobs_submitted_total";
pub const PACKETS_CREATED_TOTAL: &str = "fanout_packets_created_total";
pub const JOB_EVENTS_TOTAL: &str = "fanout_job_events_total";
pub const JOB_RUN_SECONDS: &str = "fanout_job_run_seconds";
pub const LOCK_ACQUIRED_TOTAL: &str = "fanout_lock_acquired_total";

pub struct MetricsCollector;

impl MetricsCollector {
    /// `path` is `dispatch` or `fanout`
    pub fn record_job_submitted(path: &'static str) {
        counter!(JOBS_SUBMITTED_TOTAL, "path" => path).increment(1);
    }

    pub fn record_packet_created() {
        counter!(PACKETS_CREATED_TOTAL).increment(1);
    }

    pub fn record_job_event(event: &'static str) {
        counter!(JOB_EVENTS_TOTAL, "event" => event).increment(1);
    }

    pub fn record_run_time(seconds: i64) {
        histogram!(JOB_RUN_SECONDS).record(seconds.max(0) as f64);
    }

    pub fn record_lock_acquired() {
        counter!(LOCK_ACQUIRED_TOTAL).increment(1);
    }
}
