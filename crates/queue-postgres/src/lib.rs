//! PostgreSQL implementation of the queue engine's durable store (C1).
//!
//! This crate provides the production `JobStore` implementation used by
//! `queue-api` and `queue-worker`. It owns the one capability the store
//! contract requires beyond plain CRUD: an atomic "select one claimable
//! row, update it, return it" primitive, built on `FOR UPDATE SKIP
//! LOCKED`.
//!
//! # Database schema
//!
//! See `migrations/0001_init.sql` for the full DDL. In short:
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id UUID PRIMARY KEY,
//!     tenant_id TEXT NOT NULL,
//!     status TEXT NOT NULL CHECK (status IN ('pending','running','completed','failed')),
//!     payload JSONB NOT NULL,
//!     idempotency_key TEXT,
//!     retry_count INTEGER NOT NULL DEFAULT 0,
//!     max_retries INTEGER NOT NULL DEFAULT 3,
//!     lease_expires_at TIMESTAMPTZ,
//!     worker_id TEXT,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     started_at TIMESTAMPTZ,
//!     completed_at TIMESTAMPTZ,
//!     error_message TEXT,
//!     trace_id UUID NOT NULL
//! );
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use queue_postgres::PgJobStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/queue").await?;
//! let store = PgJobStore::new(pool);
//! store.run_migrations().await?;
//! ```

use async_trait::async_trait;
use chrono::{Duration, Utc};
use queue_core::{
    retry_backoff_ms, DeadLetterEntry, Job, JobStatus, JobStore, LeaseWrite, Metrics, NewJob,
    RetryOutcome, StatusCounts, StoreError, LEASE_DURATION,
};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded migrations. Call once at process startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let status_raw: String = row
        .try_get("status")
        .map_err(|err| StoreError::Transient(err.into()))?;
    let status = JobStatus::from_db(&status_raw)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown status persisted: {status_raw}")))?;

    Ok(Job {
        id: row.try_get("id").map_err(|e| StoreError::Transient(e.into()))?,
        tenant_id: row
            .try_get("tenant_id")
            .map_err(|e| StoreError::Transient(e.into()))?,
        status,
        payload: row
            .try_get("payload")
            .map_err(|e| StoreError::Transient(e.into()))?,
        idempotency_key: row
            .try_get("idempotency_key")
            .map_err(|e| StoreError::Transient(e.into()))?,
        retry_count: row
            .try_get("retry_count")
            .map_err(|e| StoreError::Transient(e.into()))?,
        max_retries: row
            .try_get("max_retries")
            .map_err(|e| StoreError::Transient(e.into()))?,
        lease_expires_at: row
            .try_get("lease_expires_at")
            .map_err(|e| StoreError::Transient(e.into()))?,
        worker_id: row
            .try_get("worker_id")
            .map_err(|e| StoreError::Transient(e.into()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StoreError::Transient(e.into()))?,
        started_at: row
            .try_get("started_at")
            .map_err(|e| StoreError::Transient(e.into()))?,
        completed_at: row
            .try_get("completed_at")
            .map_err(|e| StoreError::Transient(e.into()))?,
        error_message: row
            .try_get("error_message")
            .map_err(|e| StoreError::Transient(e.into()))?,
        trace_id: row
            .try_get("trace_id")
            .map_err(|e| StoreError::Transient(e.into()))?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::Transient(err.into()))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn running_count(&self, tenant_id: &str) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM jobs WHERE tenant_id = $1 AND status = 'running'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| StoreError::Transient(err.into()))
    }

    async fn insert_pending(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let row = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, tenant_id, status, payload, idempotency_key,
                retry_count, max_retries, created_at, trace_id
            )
            VALUES ($1, $2, 'pending', $3, $4, 0, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&new_job.tenant_id)
        .bind(&new_job.payload)
        .bind(&new_job.idempotency_key)
        .bind(new_job.max_retries)
        .bind(now)
        .bind(new_job.trace_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::IdempotencyConflict
            } else {
                StoreError::Transient(err.into())
            }
        })?;

        job_from_row(&row)
    }

    /// Unifies initial dispatch and steal-back of an expired lease into a
    /// single claim (§4.4). The `created_at <= now()` half of the
    /// predicate makes a retry's rewritten `created_at` a genuine
    /// not-before gate (§9 Open Question 1, resolved as "honor as delay").
    async fn acquire_lease(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        let now = Utc::now();
        let lease_expires_at = now + LEASE_DURATION;

        let row = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM jobs
                WHERE (status = 'pending' AND created_at <= $1)
                   OR (status = 'running' AND lease_expires_at < $1)
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                worker_id = $2,
                lease_expires_at = $3,
                started_at = COALESCE(jobs.started_at, $1)
            WHERE id IN (SELECT id FROM claimable)
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(worker_id)
        .bind(lease_expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StoreError::Transient(err.into()))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn ack_completed(&self, job_id: Uuid, worker_id: &str) -> Result<LeaseWrite, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                completed_at = $3,
                worker_id = NULL,
                lease_expires_at = NULL
            WHERE id = $1
              AND status = 'running'
              AND worker_id = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::Transient(err.into()))?;

        if result.rows_affected() > 0 {
            Ok(LeaseWrite::Applied)
        } else {
            debug!(%job_id, worker_id, "ack found no matching leased row");
            Ok(LeaseWrite::LeaseStolen)
        }
    }

    async fn fail_attempt(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_message: &str,
    ) -> Result<RetryOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| StoreError::Transient(err.into()))?;

        let row = sqlx::query(
            r#"
            SELECT retry_count, max_retries, payload, trace_id
            FROM jobs
            WHERE id = $1 AND status = 'running' AND worker_id = $2
            FOR UPDATE
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| StoreError::Transient(err.into()))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Ok(RetryOutcome::LeaseStolen);
        };

        let retry_count: i32 = row
            .try_get("retry_count")
            .map_err(|e| StoreError::Transient(e.into()))?;
        let max_retries: i32 = row
            .try_get("max_retries")
            .map_err(|e| StoreError::Transient(e.into()))?;
        let payload: serde_json::Value = row
            .try_get("payload")
            .map_err(|e| StoreError::Transient(e.into()))?;
        let trace_id: Uuid = row
            .try_get("trace_id")
            .map_err(|e| StoreError::Transient(e.into()))?;

        // §9 Open Question 3: compare the row's retry count *before* this
        // failure against max_retries. A job with max_retries=3 tolerates
        // 3 retried failures and is dead-lettered on its 4th, still
        // carrying retry_count=3 (§8 worked example).
        let outcome = if retry_count >= max_retries {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed',
                    error_message = $2,
                    worker_id = NULL,
                    lease_expires_at = NULL
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(error_message)
            .execute(&mut *tx)
            .await
            .map_err(|err| StoreError::Transient(err.into()))?;

            let dlq_id = Uuid::new_v4();
            let failed_at = Utc::now();
            sqlx::query(
                r#"
                INSERT INTO dead_letter_entries (id, job_id, payload, final_error, failed_at, trace_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(dlq_id)
            .bind(job_id)
            .bind(&payload)
            .bind(error_message)
            .bind(failed_at)
            .bind(trace_id)
            .execute(&mut *tx)
            .await
            .map_err(|err| StoreError::Transient(err.into()))?;

            RetryOutcome::DeadLettered(DeadLetterEntry {
                id: dlq_id,
                job_id,
                payload,
                final_error: error_message.to_string(),
                failed_at,
                trace_id,
            })
        } else {
            let new_retry_count = retry_count + 1;
            let backoff_ms = retry_backoff_ms(retry_count);
            let next_created_at = Utc::now() + Duration::milliseconds(backoff_ms);

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'pending',
                    retry_count = $2,
                    error_message = $3,
                    worker_id = NULL,
                    lease_expires_at = NULL,
                    created_at = $4
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(new_retry_count)
            .bind(error_message)
            .bind(next_created_at)
            .execute(&mut *tx)
            .await
            .map_err(|err| StoreError::Transient(err.into()))?;

            RetryOutcome::Retried
        };

        tx.commit().await.map_err(|err| StoreError::Transient(err.into()))?;
        Ok(outcome)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<LeaseWrite, StoreError> {
        let lease_expires_at = Utc::now() + LEASE_DURATION;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $3
            WHERE id = $1 AND status = 'running' AND worker_id = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(lease_expires_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::Transient(err.into()))?;

        if result.rows_affected() > 0 {
            Ok(LeaseWrite::Applied)
        } else {
            Ok(LeaseWrite::LeaseStolen)
        }
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::Transient(err.into()))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_jobs(
        &self,
        tenant_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM jobs WHERE tenant_id = $1 AND status = $2 ORDER BY created_at DESC LIMIT $3",
                )
                .bind(tenant_id)
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM jobs WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(tenant_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|err| StoreError::Transient(err.into()))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn metrics(&self, tenant_id: Option<&str>) -> Result<Metrics, StoreError> {
        let row = match tenant_id {
            Some(tenant) => sqlx::query(
                r#"
                SELECT
                    COUNT(*) AS jobs_total,
                    COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                    COUNT(*) FILTER (WHERE status = 'running') AS running,
                    COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                    COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                    (SELECT COUNT(*) FROM dead_letter_entries d
                        JOIN jobs j ON j.id = d.job_id
                        WHERE j.tenant_id = $1) AS dlq_size
                FROM jobs
                WHERE tenant_id = $1
                "#,
            )
            .bind(tenant)
            .fetch_one(&self.pool)
            .await,
            None => sqlx::query(
                r#"
                SELECT
                    COUNT(*) AS jobs_total,
                    COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                    COUNT(*) FILTER (WHERE status = 'running') AS running,
                    COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                    COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                    (SELECT COUNT(*) FROM dead_letter_entries) AS dlq_size
                FROM jobs
                "#,
            )
            .fetch_one(&self.pool)
            .await,
        }
        .map_err(|err| StoreError::Transient(err.into()))?;

        Ok(Metrics {
            jobs_total: row.try_get("jobs_total").map_err(|e| StoreError::Transient(e.into()))?,
            jobs_by_status: StatusCounts {
                pending: row.try_get("pending").map_err(|e| StoreError::Transient(e.into()))?,
                running: row.try_get("running").map_err(|e| StoreError::Transient(e.into()))?,
                completed: row
                    .try_get("completed")
                    .map_err(|e| StoreError::Transient(e.into()))?,
                failed: row.try_get("failed").map_err(|e| StoreError::Transient(e.into()))?,
            },
            dlq_size: row.try_get("dlq_size").map_err(|e| StoreError::Transient(e.into()))?,
        })
    }
}

