use async_trait::async_trait;
use fanout_core::{
    models::{JobPacket, JobRecord, JobTiming, NewJobPacket, NewJobRecord},
    traits::TrackingStore,
    FanoutResult,
};
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS job_packet (
        id BIGSERIAL PRIMARY KEY,
        type VARCHAR(255) NOT NULL,
        server VARCHAR(255) NOT NULL,
        setup_time TIMESTAMP NOT NULL,
        nodes TEXT NOT NULL,
        retry INTEGER NOT NULL DEFAULT 0,
        result INTEGER NOT NULL DEFAULT 0,
        processed BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job (
        id BIGSERIAL PRIMARY KEY,
        packet_id BIGINT NOT NULL REFERENCES job_packet(id),
        job_id VARCHAR(255) NOT NULL,
        type VARCHAR(255) NOT NULL,
        server VARCHAR(255) NOT NULL,
        node VARCHAR(255) NOT NULL,
        setup_time TIMESTAMP NOT NULL,
        start_time TIMESTAMP NULL,
        end_time TIMESTAMP NULL,
        run_time BIGINT NOT NULL DEFAULT 0,
        result TEXT NOT NULL DEFAULT '',
        processed BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_job_id ON job (job_id)",
    "CREATE INDEX IF NOT EXISTS idx_job_packet_id ON job (packet_id)",
];

const JOB_COLUMNS: &str = "id, packet_id, job_id, type, server, node, setup_time, start_time, end_time, run_time, result, processed";

pub struct PostgresTrackingStore {
    pool: PgPool,
}

impl PostgresTrackingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_packet(row: &sqlx::postgres::PgRow) -> FanoutResult<JobPacket> {
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

    fn row_to_job(row: &sqlx::postgres::PgRow) -> FanoutResult<JobRecord> {
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
impl TrackingStore for PostgresTrackingStore {
    async fn ensure_schema(&self) -> FanoutResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("跟踪表结构已就绪 (PostgreSQL)");
        Ok(())
    }

    #[instrument(skip(self, packet), fields(packet_type = %packet.packet_type, nodes = packet.nodes.len()))]
    async fn insert_packet(&self, packet: &NewJobPacket) -> FanoutResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO job_packet (type, server, setup_time, nodes, retry, result, processed)
            VALUES ($1, $2, $3, $4, 0, 0, FALSE)
            RETURNING id
            "#,
        )
        .bind(&packet.packet_type)
        .bind(&packet.server)
        .bind(packet.setup_time)
        .bind(packet.nodes_column())
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!("创建任务包成功: {}", id);
        Ok(id)
    }

    #[instrument(skip(self, job), fields(packet_id = job.packet_id, job_id = %job.job_id, node = %job.node))]
    async fn insert_job(&self, job: &NewJobRecord) -> FanoutResult<()> {
        sqlx::query(
            r#"
            INSERT INTO job (packet_id, job_id, type, server, node, setup_time, run_time, result, processed)
            VALUES ($1, $2, $3, $4, $5, $6, 0, '', FALSE)
            "#,
        )
        .bind(job.packet_id)
        .bind(&job.job_id)
        .bind(&job.job_type)
        .bind(&job.server)
        .bind(&job.node)
        .bind(job.setup_time)
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
