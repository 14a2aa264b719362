use async_trait::async_trait;
use fanout_core::{
    models::{JobPacket, JobRecord, JobTiming, NewJobPacket, NewJobRecord},
    traits::TrackingStore,
    FanoutResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, instrument};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS job_packet (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        server TEXT NOT NULL,
        setup_time DATETIME NOT NULL,
        nodes TEXT NOT NULL,
        retry INTEGER NOT NULL DEFAULT 0,
        result INTEGER NOT NULL DEFAULT 0,
        processed BOOLEAN NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        packet_id INTEGER NOT NULL REFERENCES job_packet(id),
        job_id TEXT NOT NULL,
        type TEXT NOT NULL,
        server TEXT NOT NULL,
        node TEXT NOT NULL,
        setup_time DATETIME NOT NULL,
        start_time DATETIME NULL,
        end_time DATETIME NULL,
        run_time INTEGER NOT NULL DEFAULT 0,
        result TEXT NOT NULL DEFAULT '',
        processed BOOLEAN NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_job_id ON job (job_id)",
    "CREATE INDEX IF NOT EXISTS idx_job_packet_id ON job (packet_id)",
];

const JOB_COLUMNS: &str = "id, packet_id, job_id, type, server, node, setup_time, start_time, end_time, run_time, result, processed";

pub struct SqliteTrackingStore {
    pool: SqlitePool,
}

impl SqliteTrackingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 单连接的内存数据库，已建好表结构
    pub async fn in_memory() -> FanoutResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    fn row_to_packet(row: &sqlx::sqlite::SqliteRow) -> FanoutResult<JobPacket> {
        Ok(JobPacket {
            id: row.try_get("id")?,
            packet_type: row.try_get("type")?,
            server: row.try_get("server")?,
            setup_time: row.try_get("setup_time")?,
            nodes: row.try_get("nodes")?,
            retry: row.try_get("retry")?,
            result: row.try_get("result")?,
            processed: row.try_get("processed")?,
        })
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> FanoutResult<JobRecord> {
        Ok(JobRecord {
            id: row.try_get("id")?,
            packet_id: row.try_get("packet_id")?,
            job_id: row.try_get("job_id")?,
            job_type: row.try_get("type")?,
            server: row.try_get("server")?,
            node: row.try_get("node")?,
            setup_time: row.try_get("setup_time")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            run_time: row.try_get("run_time")?,
            result: row.try_get("result")?,
            processed: row.try_get("processed")?,
        })
    }
}

#[async_trait]
impl TrackingStore for SqliteTrackingStore {
    async fn ensure_schema(&self) -> FanoutResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("跟踪表结构已就绪 (SQLite)");
        Ok(())
    }

    #[instrument(skip(self, packet), fields(packet_type = %packet.packet_type, nodes = packet.nodes.len()))]
    async fn insert_packet(&self, packet: &NewJobPacket) -> FanoutResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_packet (type, server, setup_time, nodes, retry, result, processed)
            VALUES ($1, $2, $3, $4, 0, 0, $5)
            "#,
        )
        .bind(&packet.packet_type)
        .bind(&packet.server)
        .bind(packet.setup_time)
        .bind(packet.nodes_column())
        .bind(false)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("创建任务包成功: {}", id);
        Ok(id)
    }

    #[instrument(skip(self, job), fields(packet_id = job.packet_id, job_id = %job.job_id, node = %job.node))]
    async fn insert_job(&self, job: &NewJobRecord) -> FanoutResult<()> {
        sqlx::query(
            r#"
            INSERT INTO job (packet_id, job_id, type, server, node, setup_time, run_time, result, processed)
            VALUES ($1, $2, $3, $4, $5, $6, 0, '', $7)
            "#,
        )
        .bind(job.packet_id)
        .bind(&job.job_id)
        .bind(&job.job_type)
        .bind(&job.server)
        .bind(&job.node)
        .bind(job.setup_time)
        .bind(false)
        .execute(&self.pool)
        .await?;

        debug!("创建任务记录成功: {}", job.job_id);
        Ok(())
    }

    async fn find_jobs_by_uid(&self, job_uid: &str) -> FanoutResult<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job WHERE job_id = $1 ORDER BY id"
        ))
        .bind(job_uid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self, timing))]
    async fn update_job_timing(&self, job_uid: &str, timing: &JobTiming) -> FanoutResult<u64> {
        let result = sqlx::query(
            "UPDATE job SET start_time = $1, end_time = $2, run_time = $3 WHERE job_id = $4",
        )
        .bind(timing.start_time)
        .bind(timing.end_time)
        .bind(timing.run_time)
        .bind(job_uid)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, result))]
    async fn update_job_result(&self, job_uid: &str, result: &str) -> FanoutResult<u64> {
        let outcome = sqlx::query("UPDATE job SET result = $1 WHERE job_id = $2")
            .bind(result)
            .bind(job_uid)
            .execute(&self.pool)
            .await?;

        Ok(outcome.rows_affected())
    }

    async fn get_packet(&self, packet_id: i64) -> FanoutResult<Option<JobPacket>> {
        let row = sqlx::query(
            "SELECT id, type, server, setup_time, nodes, retry, result, processed FROM job_packet WHERE id = $1",
        )
        .bind(packet_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_packet).transpose()
    }

    async fn jobs_for_packet(&self, packet_id: i64) -> FanoutResult<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job WHERE packet_id = $1 ORDER BY id"
        ))
        .bind(packet_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn health_check(&self) -> FanoutResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::time::parse_time;

    fn packet(nodes: &[&str]) -> NewJobPacket {
        NewJobPacket {
            packet_type: "ping".to_string(),
            server: "s1".to_string(),
            setup_time: parse_time("2024-01-01 12:00:00").unwrap(),
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn job(packet_id: i64, job_id: &str, node: &str) -> NewJobRecord {
        NewJobRecord {
            packet_id,
            job_id: job_id.to_string(),
            job_type: "ping".to_string(),
            server: "s1".to_string(),
            node: node.to_string(),
            setup_time: parse_time("2024-01-01 12:00:00").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_packet_and_jobs_round_trip() {
        let store = SqliteTrackingStore::in_memory().await.unwrap();
        let packet_id = store.insert_packet(&packet(&["n1", "n2"])).await.unwrap();

        store.insert_job(&job(packet_id, "a", "n1")).await.unwrap();
        store.insert_job(&job(packet_id, "b", "n2")).await.unwrap();

        let stored = store.get_packet(packet_id).await.unwrap().unwrap();
        assert_eq!(stored.nodes, "n1, n2");
        assert_eq!(stored.retry, 0);
        assert!(!stored.processed);

        let jobs = store.jobs_for_packet(packet_id).await.unwrap();
        let nodes: Vec<_> = jobs.iter().map(|j| j.node.as_str()).collect();
        assert_eq!(nodes, vec!["n1", "n2"]);
        assert!(jobs.iter().all(|j| j.start_time.is_none() && j.run_time == 0));
    }

    #[tokio::test]
    async fn test_update_timing_reports_row_count() {
        let store = SqliteTrackingStore::in_memory().await.unwrap();
        let packet_id = store.insert_packet(&packet(&["n1"])).await.unwrap();
        store.insert_job(&job(packet_id, "a", "n1")).await.unwrap();

        let timing = JobTiming::between(
            parse_time("2024-01-01 12:00:05").unwrap(),
            parse_time("2024-01-01 12:00:35").unwrap(),
        );
        assert_eq!(store.update_job_timing("a", &timing).await.unwrap(), 1);
        assert_eq!(store.update_job_timing("missing", &timing).await.unwrap(), 0);

        let rows = store.find_jobs_by_uid("a").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].run_time, 30);
        assert_eq!(rows[0].end_time, Some(timing.end_time));

        assert_eq!(store.update_job_result("a", "complete").await.unwrap(), 1);
        assert_eq!(store.find_jobs_by_uid("a").await.unwrap()[0].result, "complete");
    }

    #[tokio::test]
    async fn test_missing_packet() {
        let store = SqliteTrackingStore::in_memory().await.unwrap();
        assert!(store.get_packet(42).await.unwrap().is_none());
        assert!(store.jobs_for_packet(42).await.unwrap().is_empty());
        store.health_check().await.unwrap();
    }
}
