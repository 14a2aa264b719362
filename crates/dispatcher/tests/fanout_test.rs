use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanout_core::models::{
    AdminStatus, BrokerJobStatus, FunctionTemplate, JobHandle, JobPacket, JobParams, JobRecord,
    JobTiming, NewJobPacket, NewJobRecord, SubmitRequest, PARAM_JOB_PACKET_ID, PARAM_NODE,
};
use fanout_core::traits::{JobQueue, TrackingStore, WorkerChannel};
use fanout_core::{FanoutError, FanoutResult};
use fanout_dispatcher::{
    idempotency_key, FanoutCoordinator, JobDispatcher, StaticNodeDirectory, StatusTracker,
};
use fanout_infrastructure::{InMemoryCache, InMemoryJobQueue, SqliteTrackingStore, TrackingCache};

const REQUIRED: [&str; 3] = ["server", "ip", "check"];

fn request() -> JobParams {
    JobParams::from([("server", "s1"), ("ip", "10.0.0.7"), ("check", "icmp")])
}

fn template() -> FunctionTemplate {
    FunctionTemplate::new("monitor_{node}").unwrap()
}

/// 第 `fail_on` 次提交返回队列连接错误的队列
struct FlakyQueue {
    inner: InMemoryJobQueue,
    submissions: AtomicUsize,
    fail_on: usize,
}

impl FlakyQueue {
    fn new(fail_on: usize) -> Self {
        Self {
            inner: InMemoryJobQueue::new(),
            submissions: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn submit(&self, request: SubmitRequest) -> FanoutResult<JobHandle> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(FanoutError::BrokerConnection("connection reset".into()));
        }
        self.inner.submit(request).await
    }

    async fn status(&self, job_id: &str) -> FanoutResult<BrokerJobStatus> {
        self.inner.status(job_id).await
    }

    async fn admin_status(&self) -> FanoutResult<AdminStatus> {
        self.inner.admin_status().await
    }
}

/// 第 `fail_on` 次写入任务行失败的存储
struct FlakyStore {
    inner: SqliteTrackingStore,
    inserts: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl TrackingStore for FlakyStore {
    async fn ensure_schema(&self) -> FanoutResult<()> {
        self.inner.ensure_schema().await
    }

    async fn insert_packet(&self, packet: &NewJobPacket) -> FanoutResult<i64> {
        self.inner.insert_packet(packet).await
    }

    async fn insert_job(&self, job: &NewJobRecord) -> FanoutResult<()> {
        let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(FanoutError::Internal("disk full".into()));
        }
        self.inner.insert_job(job).await
    }

    async fn find_jobs_by_uid(&self, job_uid: &str) -> FanoutResult<Vec<JobRecord>> {
        self.inner.find_jobs_by_uid(job_uid).await
    }

    async fn update_job_timing(&self, job_uid: &str, timing: &JobTiming) -> FanoutResult<u64> {
        self.inner.update_job_timing(job_uid, timing).await
    }

    async fn update_job_result(&self, job_uid: &str, result: &str) -> FanoutResult<u64> {
        self.inner.update_job_result(job_uid, result).await
    }

    async fn get_packet(&self, packet_id: i64) -> FanoutResult<Option<JobPacket>> {
        self.inner.get_packet(packet_id).await
    }

    async fn jobs_for_packet(&self, packet_id: i64) -> FanoutResult<Vec<JobRecord>> {
        self.inner.jobs_for_packet(packet_id).await
    }

    async fn health_check(&self) -> FanoutResult<()> {
        self.inner.health_check().await
    }
}

async fn coordinator(
    queue: Arc<dyn JobQueue>,
    nodes: &[&str],
) -> (FanoutCoordinator, Arc<SqliteTrackingStore>) {
    let store = Arc::new(SqliteTrackingStore::in_memory().await.unwrap());
    let directory = StaticNodeDirectory::new(nodes.iter().map(|n| n.to_string()).collect());
    (
        FanoutCoordinator::new(queue, store.clone(), Arc::new(directory)),
        store,
    )
}

#[tokio::test]
async fn test_fanout_two_nodes_end_to_end() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let (coordinator, store) = coordinator(queue.clone(), &["n1", "n2"]).await;

    let response = coordinator
        .submit(&request(), &template(), &REQUIRED, "monitor")
        .await;

    assert!(response.result, "{:?}", response.error);
    assert_eq!(
        response.job.keys().cloned().collect::<Vec<_>>(),
        vec!["n1", "n2"]
    );

    let packet_id = response.packet_id.unwrap();
    let packet = store.get_packet(packet_id).await.unwrap().unwrap();
    assert_eq!(packet.nodes, "n1, n2");
    assert_eq!(packet.server, "s1");
    assert_eq!(packet.packet_type, "monitor");

    let jobs = store.jobs_for_packet(packet_id).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].node, "n1");
    assert_eq!(jobs[1].node, "n2");

    assert_eq!(queue.queued_count("monitor_n1").await, 1);
    assert_eq!(queue.queued_count("monitor_n2").await, 1);

    let n2 = &response.job["n2"];
    assert_eq!(n2.params.get_string(PARAM_NODE).as_deref(), Some("n2"));
    assert_eq!(
        n2.params.get(PARAM_JOB_PACKET_ID),
        Some(&serde_json::Value::from(packet_id))
    );
}

#[tokio::test]
async fn test_node_assignment_is_a_bijection() {
    let nodes = ["a", "b", "c", "d", "e"];
    let (coordinator, store) = coordinator(Arc::new(InMemoryJobQueue::new()), &nodes).await;

    let response = coordinator
        .submit(&request(), &template(), &REQUIRED, "monitor")
        .await;
    let packet_id = response.packet_id.unwrap();

    let jobs = store.jobs_for_packet(packet_id).await.unwrap();
    assert_eq!(jobs.len(), nodes.len());
    assert!(jobs.iter().all(|j| j.packet_id == packet_id));

    let assigned: BTreeSet<_> = jobs.iter().map(|j| j.node.as_str()).collect();
    assert_eq!(assigned, nodes.iter().copied().collect::<BTreeSet<_>>());

    for job in &jobs {
        assert_eq!(response.job[&job.node].id, job.job_id);
    }
}

#[tokio::test]
async fn test_each_missing_required_parameter_is_named() {
    let (coordinator, store) = coordinator(Arc::new(InMemoryJobQueue::new()), &["n1"]).await;

    for missing in REQUIRED {
        let params: JobParams = request()
            .iter()
            .filter(|(k, _)| k.as_str() != missing)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let response = coordinator
            .submit(&params, &template(), &REQUIRED, "monitor")
            .await;

        assert!(!response.result);
        assert_eq!(response.missing_parameter(), Some(missing));
        assert_eq!(response.error.as_ref().unwrap().code, "missing_parameter");
    }

    assert!(store.get_packet(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_partial_failure_keeps_earlier_rows() {
    let queue = Arc::new(FlakyQueue::new(2));
    let (coordinator, store) = coordinator(queue.clone(), &["n1", "n2", "n3"]).await;

    let response = coordinator
        .submit(&request(), &template(), &REQUIRED, "monitor")
        .await;

    assert!(!response.result);
    assert_eq!(response.error.as_ref().unwrap().code, "broker_connection");

    // no compensation: the packet and the first node's job survive
    let packet_id = response.packet_id.unwrap();
    let packet = store.get_packet(packet_id).await.unwrap().unwrap();
    assert_eq!(packet.nodes, "n1, n2, n3");

    let jobs = store.jobs_for_packet(packet_id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].node, "n1");
    assert_eq!(response.job.keys().collect::<Vec<_>>(), vec!["n1"]);
    assert_eq!(queue.inner.queued_count("monitor_n1").await, 1);
    assert_eq!(queue.inner.queued_count("monitor_n3").await, 0);
}

#[tokio::test]
async fn test_job_row_write_failure_keeps_earlier_rows() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let store = Arc::new(FlakyStore {
        inner: SqliteTrackingStore::in_memory().await.unwrap(),
        inserts: AtomicUsize::new(0),
        fail_on: 2,
    });
    let directory = StaticNodeDirectory::new(vec!["n1".into(), "n2".into(), "n3".into()]);
    let coordinator = FanoutCoordinator::new(queue.clone(), store.clone(), Arc::new(directory));

    let response = coordinator
        .submit(&request(), &template(), &REQUIRED, "monitor")
        .await;

    assert!(!response.result);
    assert_eq!(response.error.as_ref().unwrap().code, "internal");

    let packet_id = response.packet_id.unwrap();
    let packet = store.get_packet(packet_id).await.unwrap().unwrap();
    assert_eq!(packet.nodes, "n1, n2, n3");

    let jobs = store.jobs_for_packet(packet_id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].node, "n1");
    assert_eq!(response.job.keys().collect::<Vec<_>>(), vec!["n1"]);

    // n2 was queued before its row failed and stays queued without a row
    assert_eq!(queue.queued_count("monitor_n2").await, 1);
    assert_eq!(queue.queued_count("monitor_n3").await, 0);
}

#[tokio::test]
async fn test_dispatch_key_is_hash_of_submitted_params() {
    let tracking = TrackingCache::new(Arc::new(InMemoryCache::new()));
    let dispatcher = JobDispatcher::new(
        Arc::new(InMemoryJobQueue::new()),
        tracking,
        Duration::from_secs(60),
    );

    let response = dispatcher
        .submit(&request(), "monitor", &REQUIRED, "monitor")
        .await
        .unwrap();

    let first = idempotency_key(&response.job.params).unwrap();
    let second = idempotency_key(&response.job.params.clone()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, response.job.id);
}

#[tokio::test]
async fn test_status_of_fanned_out_job_comes_from_store() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let (coordinator, store) = coordinator(queue.clone(), &["n1"]).await;
    let response = coordinator
        .submit(&request(), &template(), &REQUIRED, "monitor")
        .await;
    let job_id = response.job["n1"].id.clone();

    let tracker = StatusTracker::new(
        TrackingCache::new(Arc::new(InMemoryCache::new())),
        store,
        queue.clone(),
    );

    let lookup = tracker.lookup(&job_id).await.unwrap();
    assert!(matches!(
        lookup.job_data,
        Some(fanout_core::models::TrackedJob::Store(ref row)) if row.node == "n1"
    ));

    let job = queue
        .grab_job(&["monitor_n1".to_string()], Duration::ZERO)
        .await
        .unwrap()
        .unwrap();
    queue.send_work_fail(&job.id, "unreachable").await.unwrap();

    let lookup = tracker.lookup(&job_id).await.unwrap();
    assert_eq!(
        lookup.status,
        fanout_core::models::LookupState::Complete {
            result: Some("unreachable".into()),
            failed: true
        }
    );

    let packet = tracker
        .lookup_packet(response.packet_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet.jobs.len(), 1);
}

#[tokio::test]
async fn test_status_of_unknown_id() {
    let (tracker_store, queue) = (
        Arc::new(SqliteTrackingStore::in_memory().await.unwrap()),
        Arc::new(InMemoryJobQueue::new()),
    );
    let tracker = StatusTracker::new(
        TrackingCache::new(Arc::new(InMemoryCache::new())),
        tracker_store,
        queue,
    );

    let lookup = tracker.lookup("does-not-exist").await.unwrap();
    assert_eq!(lookup.status, fanout_core::models::LookupState::Unknown);
}
